use serde_json::Value;

use crate::condition::Condition;
use crate::error::{ExecError, ValidationError};
use crate::graph::{DecisionConfig, LABEL_FALSE, LABEL_TRUE};
use crate::scope::Lookup;

use super::NodeOutput;

/// Evaluates a condition and picks the `true` or `false` edge.
#[derive(Debug, Clone)]
pub struct DecisionExecutor {
    condition: Condition,
}

impl DecisionExecutor {
    pub fn build(node_id: &str, cfg: &DecisionConfig) -> Result<Self, ValidationError> {
        let condition =
            Condition::parse(&cfg.condition).map_err(|e| ValidationError::InvalidConfig {
                node: node_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { condition })
    }

    pub fn execute(&self, scope: &dyn Lookup) -> Result<NodeOutput, ExecError> {
        let taken = self.condition.evaluate(scope)?;
        Ok(NodeOutput {
            result: Value::Bool(taken),
            next_label: Some(if taken { LABEL_TRUE } else { LABEL_FALSE }.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn build(cond: &str) -> DecisionExecutor {
        DecisionExecutor::build(
            "d",
            &DecisionConfig {
                condition: cond.into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn selects_label_from_condition() {
        let mut scope = Map::new();
        scope.insert("input".into(), json!({"x": 5}));

        let out = build("${input.x} > 3").execute(&scope).unwrap();
        assert_eq!(out.result, json!(true));
        assert_eq!(out.next_label.as_deref(), Some("true"));

        scope.insert("input".into(), json!({"x": 1}));
        let out = build("${input.x} > 3").execute(&scope).unwrap();
        assert_eq!(out.next_label.as_deref(), Some("false"));
    }

    #[test]
    fn malformed_condition_is_invalid_config() {
        let err = DecisionExecutor::build(
            "d",
            &DecisionConfig {
                condition: "${input.x} >>> 3".into(),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }
}
