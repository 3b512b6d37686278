use serde::{Deserialize, Serialize};

/// Label on the edge a Decision follows when its condition holds.
pub const LABEL_TRUE: &str = "true";
/// Label on the edge a Decision follows when its condition does not hold.
pub const LABEL_FALSE: &str = "false";
/// Label on the edge from a Loop node to the first node of its body.
pub const LABEL_BODY: &str = "body";
/// Label on the edge a Loop follows once every iteration has run.
pub const LABEL_EXIT: &str = "exit";

/// A directed edge between two nodes.
///
/// Unlabeled edges are unconditional sequencing. Labels only carry meaning on
/// edges leaving Decision (`true`/`false`) and Loop (`body`/`exit`) nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Create an unconditional edge.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: None,
        }
    }

    /// Create a labeled edge.
    pub fn labeled(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: Some(label.into()),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label() == Some(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlabeled_edge_omits_label() {
        let json = serde_json::to_value(Edge::new("a", "b")).unwrap();
        assert_eq!(json, serde_json::json!({"source": "a", "target": "b"}));
    }

    #[test]
    fn labeled_edge_parses() {
        let edge: Edge =
            serde_json::from_str(r#"{"source":"d","target":"x","label":"true"}"#).unwrap();
        assert!(edge.has_label(LABEL_TRUE));
        assert!(!edge.has_label(LABEL_FALSE));
        assert_eq!(edge, Edge::labeled("d", "x", "true"));
    }
}
