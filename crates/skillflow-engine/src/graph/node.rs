use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The five node kinds a workflow can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Tool,
    Decision,
    Loop,
    Merge,
    Transform,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Decision => "decision",
            Self::Loop => "loop",
            Self::Merge => "merge",
            Self::Transform => "transform",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a Tool node does when the call fails or times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Fail the run.
    #[default]
    Abort,
    /// Store `null` as the node's result and keep going.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Registered tool name.
    pub tool: String,
    /// Parameter template, resolved against the context before the call.
    #[serde(default = "empty_params")]
    pub params: Value,
    /// Overrides the tool's own timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub on_error: ErrorPolicy,
}

fn empty_params() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// `${...}` reference to the array being iterated.
    pub iteration_source: String,
    /// Falls back to the engine's `default_max_iterations` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    /// Extra scope name bound to the current element, next to `loop_var`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub inputs: Vec<Value>,
    pub strategy: String,
    /// Joiner for `concatenate`.
    #[serde(default)]
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Value>,
    /// Result stored when the operation fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Value>,
}

impl TransformConfig {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            source: None,
            fields: vec![],
            template: None,
            predicate: None,
            expression: None,
            fallback: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<Value>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn with_expression(mut self, expression: impl Into<Value>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Kind-specific node configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Tool(ToolConfig),
    Decision(DecisionConfig),
    Loop(LoopConfig),
    Merge(MergeConfig),
    Transform(TransformConfig),
}

impl NodeConfig {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Tool(_) => NodeKind::Tool,
            Self::Decision(_) => NodeKind::Decision,
            Self::Loop(_) => NodeKind::Loop,
            Self::Merge(_) => NodeKind::Merge,
            Self::Transform(_) => NodeKind::Transform,
        }
    }
}

/// A node in a workflow graph.
///
/// On the wire a node is `{ "id", "kind", "config" }`; the config object is
/// parsed according to `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: String,
    pub config: NodeConfig,
}

impl Node {
    pub fn new(id: impl Into<String>, config: NodeConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }

    /// A Tool node calling `tool` with the given parameter template.
    pub fn tool(id: impl Into<String>, tool: impl Into<String>, params: Value) -> Self {
        Self::new(
            id,
            NodeConfig::Tool(ToolConfig {
                tool: tool.into(),
                params,
                timeout_secs: None,
                on_error: ErrorPolicy::Abort,
            }),
        )
    }

    pub fn decision(id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeConfig::Decision(DecisionConfig {
                condition: condition.into(),
            }),
        )
    }

    pub fn loop_over(id: impl Into<String>, iteration_source: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeConfig::Loop(LoopConfig {
                iteration_source: iteration_source.into(),
                max_iterations: None,
                item_alias: None,
            }),
        )
    }

    pub fn merge(id: impl Into<String>, strategy: impl Into<String>, inputs: Vec<Value>) -> Self {
        Self::new(
            id,
            NodeConfig::Merge(MergeConfig {
                inputs,
                strategy: strategy.into(),
                separator: String::new(),
            }),
        )
    }

    pub fn transform(id: impl Into<String>, config: TransformConfig) -> Self {
        Self::new(id, NodeConfig::Transform(config))
    }

    /// Set the failure policy of a Tool node. No effect on other kinds.
    pub fn with_on_error(mut self, policy: ErrorPolicy) -> Self {
        if let NodeConfig::Tool(ref mut cfg) = self.config {
            cfg.on_error = policy;
        }
        self
    }

    /// Set the per-call timeout of a Tool node. No effect on other kinds.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        if let NodeConfig::Tool(ref mut cfg) = self.config {
            cfg.timeout_secs = Some(secs);
        }
        self
    }

    /// Set the iteration cap of a Loop node. No effect on other kinds.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        if let NodeConfig::Loop(ref mut cfg) = self.config {
            cfg.max_iterations = Some(max);
        }
        self
    }

    /// Set the separator of a Merge node. No effect on other kinds.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        if let NodeConfig::Merge(ref mut cfg) = self.config {
            cfg.separator = separator.into();
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.config.kind()
    }
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    kind: NodeKind,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawNode> for Node {
    type Error = String;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let config = if raw.config.is_null() {
            Value::Object(Default::default())
        } else {
            raw.config
        };
        let err = |e: serde_json::Error| format!("node '{}' ({}): {}", raw.id, raw.kind, e);
        let config = match raw.kind {
            NodeKind::Tool => NodeConfig::Tool(serde_json::from_value(config).map_err(err)?),
            NodeKind::Decision => {
                NodeConfig::Decision(serde_json::from_value(config).map_err(err)?)
            }
            NodeKind::Loop => NodeConfig::Loop(serde_json::from_value(config).map_err(err)?),
            NodeKind::Merge => NodeConfig::Merge(serde_json::from_value(config).map_err(err)?),
            NodeKind::Transform => {
                NodeConfig::Transform(serde_json::from_value(config).map_err(err)?)
            }
        };
        Ok(Node { id: raw.id, config })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let kind = node.kind();
        let config = match node.config {
            NodeConfig::Tool(c) => serde_json::to_value(c),
            NodeConfig::Decision(c) => serde_json::to_value(c),
            NodeConfig::Loop(c) => serde_json::to_value(c),
            NodeConfig::Merge(c) => serde_json::to_value(c),
            NodeConfig::Transform(c) => serde_json::to_value(c),
        }
        .unwrap_or(Value::Null);
        RawNode {
            id: node.id,
            kind,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_tool_node_with_defaults() {
        let node: Node = serde_json::from_value(json!({
            "id": "search",
            "kind": "tool",
            "config": { "tool": "web_search" }
        }))
        .unwrap();
        assert_eq!(node.kind(), NodeKind::Tool);
        let NodeConfig::Tool(cfg) = &node.config else {
            panic!("expected tool config");
        };
        assert_eq!(cfg.tool, "web_search");
        assert_eq!(cfg.params, json!({}));
        assert_eq!(cfg.on_error, ErrorPolicy::Abort);
        assert!(cfg.timeout_secs.is_none());
    }

    #[test]
    fn parse_loop_node() {
        let node: Node = serde_json::from_value(json!({
            "id": "each",
            "kind": "loop",
            "config": { "iteration_source": "${items}", "max_iterations": 3 }
        }))
        .unwrap();
        assert_eq!(
            node.config,
            NodeConfig::Loop(LoopConfig {
                iteration_source: "${items}".into(),
                max_iterations: Some(3),
                item_alias: None,
            })
        );
    }

    #[test]
    fn missing_required_field_names_the_node() {
        let err = serde_json::from_value::<Node>(json!({
            "id": "d",
            "kind": "decision",
            "config": {}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("node 'd' (decision)"));
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(serde_json::from_value::<Node>(json!({
            "id": "x",
            "kind": "teleport",
            "config": {}
        }))
        .is_err());
    }

    #[test]
    fn serializes_as_id_kind_config() {
        let node = Node::tool("t", "echo", json!({"a": 1})).with_on_error(ErrorPolicy::Continue);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["kind"], "tool");
        assert_eq!(json["config"]["on_error"], "continue");
        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn builders_only_touch_their_kind() {
        let node = Node::decision("d", "true").with_timeout(5).with_max_iterations(2);
        assert_eq!(node, Node::decision("d", "true"));
    }
}
