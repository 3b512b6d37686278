//! One executor per node kind, selected when the graph is validated.

pub mod decision;
pub mod iterate;
pub mod merge;
pub mod tool;
pub mod transform;

use serde_json::Value;

use crate::error::{ExecError, ValidationError};
use crate::graph::{ErrorPolicy, Node, NodeConfig, NodeKind};

pub use decision::DecisionExecutor;
pub use iterate::{LoopExecutor, LOOP_INDEX, LOOP_VAR};
pub use merge::{MergeExecutor, MergeStrategy};
pub use tool::ToolExecutor;
pub use transform::{TransformExecutor, TransformOp};

/// What a node produced and which labeled edge to follow next.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub result: Value,
    /// `None` follows every outgoing edge.
    pub next_label: Option<String>,
}

impl NodeOutput {
    pub fn value(result: Value) -> Self {
        Self {
            result,
            next_label: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeExecutor {
    Tool(ToolExecutor),
    Decision(DecisionExecutor),
    Loop(LoopExecutor),
    Merge(MergeExecutor),
    Transform(TransformExecutor),
}

impl NodeExecutor {
    /// Check a node's config and prepare its executor.
    pub fn build(node: &Node) -> Result<Self, ValidationError> {
        Ok(match &node.config {
            NodeConfig::Tool(cfg) => Self::Tool(ToolExecutor::build(&node.id, cfg)?),
            NodeConfig::Decision(cfg) => Self::Decision(DecisionExecutor::build(&node.id, cfg)?),
            NodeConfig::Loop(cfg) => Self::Loop(LoopExecutor::build(&node.id, cfg)?),
            NodeConfig::Merge(cfg) => Self::Merge(MergeExecutor::build(&node.id, cfg)?),
            NodeConfig::Transform(cfg) => {
                Self::Transform(TransformExecutor::build(&node.id, cfg)?)
            }
        })
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Tool(_) => NodeKind::Tool,
            Self::Decision(_) => NodeKind::Decision,
            Self::Loop(_) => NodeKind::Loop,
            Self::Merge(_) => NodeKind::Merge,
            Self::Transform(_) => NodeKind::Transform,
        }
    }

    /// The result to store instead of failing the run, if this node tolerates `err`.
    ///
    /// Tool nodes with `on_error = continue` tolerate call failures and
    /// timeouts (not unresolved parameters). Transform nodes with a fallback
    /// tolerate any failure of their operation.
    pub fn recovery(&self, err: &ExecError) -> Option<Value> {
        match self {
            Self::Tool(t) if t.on_error() == ErrorPolicy::Continue && err.is_tool_failure() => {
                Some(Value::Null)
            }
            Self::Transform(t) if !matches!(err, ExecError::Cancelled | ExecError::RunTimeout(_)) => {
                t.fallback().cloned()
            }
            _ => None,
        }
    }
}
