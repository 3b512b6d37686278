use skillflow_core::types::ValidationIssue;

/// A structural problem found while validating a workflow graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("edge #{index} ({from} -> {to}) references unknown node '{missing}'")]
    DanglingEdge {
        index: usize,
        from: String,
        to: String,
        missing: String,
    },

    #[error("node '{0}' is defined more than once")]
    DuplicateNode(String),

    #[error("node '{0}' has no incoming edge and is not the entry node")]
    OrphanNode(String),

    #[error("multiple entry points: {}", .0.join(", "))]
    MultipleEntryPoints(Vec<String>),

    #[error("no entry node: {0}")]
    MissingEntry(String),

    #[error("decision '{node}' needs exactly one \"true\" and one \"false\" edge, found [{}]", .labels.join(", "))]
    DecisionArity { node: String, labels: Vec<String> },

    #[error("loop '{node}' has a malformed iteration source '{reference}': {reason}")]
    LoopSource {
        node: String,
        reference: String,
        reason: String,
    },

    #[error("loop '{node}': {reason}")]
    LoopStructure { node: String, reason: String },

    #[error("node '{node}' has invalid config: {reason}")]
    InvalidConfig { node: String, reason: String },

    #[error("cycle through nodes: {}", .0.join(", "))]
    Cycle(Vec<String>),
}

impl ValidationError {
    /// Stable kind name used in `validation_error` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DanglingEdge { .. } => "dangling_edge",
            Self::DuplicateNode(_) => "duplicate_node",
            Self::OrphanNode(_) => "orphan_node",
            Self::MultipleEntryPoints(_) => "multiple_entry_points",
            Self::MissingEntry(_) => "missing_entry",
            Self::DecisionArity { .. } => "decision_arity",
            Self::LoopSource { .. } => "loop_source",
            Self::LoopStructure { .. } => "loop_structure",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Cycle(_) => "cycle",
        }
    }

    /// Node ids the error is about.
    pub fn nodes(&self) -> Vec<String> {
        match self {
            Self::DanglingEdge { from, to, .. } => vec![from.clone(), to.clone()],
            Self::DuplicateNode(n) | Self::OrphanNode(n) => vec![n.clone()],
            Self::MultipleEntryPoints(ns) | Self::Cycle(ns) => ns.clone(),
            Self::MissingEntry(_) => vec![],
            Self::DecisionArity { node, .. }
            | Self::LoopSource { node, .. }
            | Self::LoopStructure { node, .. }
            | Self::InvalidConfig { node, .. } => vec![node.clone()],
        }
    }

    pub fn to_issue(&self) -> ValidationIssue {
        ValidationIssue {
            kind: self.kind().to_string(),
            message: self.to_string(),
            nodes: self.nodes(),
        }
    }
}

/// A failure while executing a node.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("path '{path}' not found (unresolved segment '{segment}')")]
    PathNotFound { path: String, segment: String },

    #[error("malformed reference: {0}")]
    Syntax(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("tool '{tool}' failed: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("tool '{tool}' timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    #[error("iteration source has more than {max} items")]
    LoopLimitExceeded { max: usize },

    #[error("'{path}' resolved to {found}, expected an array")]
    NotAnArray { path: String, found: String },

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("run exceeded its {0}s time budget")]
    RunTimeout(u64),
}

impl ExecError {
    /// Stable kind name used in `node_error` and `skill_failed` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PathNotFound { .. } => "path_not_found",
            Self::Syntax(_) => "syntax",
            Self::InvalidCondition(_) => "invalid_condition",
            Self::ToolFailure { .. } => "tool_failure",
            Self::Timeout { .. } => "timeout",
            Self::LoopLimitExceeded { .. } => "loop_limit_exceeded",
            Self::NotAnArray { .. } => "not_an_array",
            Self::Transform(_) => "transform",
            Self::Merge(_) => "merge",
            Self::Cancelled => "cancelled",
            Self::RunTimeout(_) => "run_timeout",
        }
    }

    /// Failures of the tool call itself, as opposed to resolution or control flow.
    pub fn is_tool_failure(&self) -> bool {
        matches!(self, Self::ToolFailure { .. } | Self::Timeout { .. })
    }
}

/// Short JSON type name for error messages.
pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_issue_carries_kind_and_nodes() {
        let issue = ValidationError::Cycle(vec!["a".into(), "b".into()]).to_issue();
        assert_eq!(issue.kind, "cycle");
        assert_eq!(issue.nodes, vec!["a", "b"]);
        assert!(issue.message.contains("a, b"));
    }

    #[test]
    fn dangling_edge_message() {
        let err = ValidationError::DanglingEdge {
            index: 2,
            from: "a".into(),
            to: "ghost".into(),
            missing: "ghost".into(),
        };
        assert_eq!(err.kind(), "dangling_edge");
        assert!(err.to_string().contains("unknown node 'ghost'"));
    }

    #[test]
    fn exec_error_kinds() {
        let err = ExecError::PathNotFound {
            path: "a.b".into(),
            segment: "b".into(),
        };
        assert_eq!(err.kind(), "path_not_found");
        assert!(!err.is_tool_failure());
        assert!(ExecError::Timeout {
            tool: "t".into(),
            timeout_secs: 1
        }
        .is_tool_failure());
        assert_eq!(ExecError::LoopLimitExceeded { max: 3 }.kind(), "loop_limit_exceeded");
    }
}
