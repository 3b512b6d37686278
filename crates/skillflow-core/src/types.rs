use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a single workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a tool invocation.
///
/// `is_error` marks a failure reported by the tool itself; the engine treats
/// it the same as an invocation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: serde_json::Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: serde_json::Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: serde_json::Value::String(message.into()),
            is_error: true,
        }
    }

    /// Error text for failed results, whatever shape the content has.
    pub fn error_message(&self) -> String {
        match &self.content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    pub node_id: String,
    pub working_dir: PathBuf,
}

impl ToolContext {
    pub fn new(run_id: RunId, node_id: impl Into<String>) -> Self {
        Self {
            run_id,
            node_id: node_id.into(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
        }
    }
}

/// One structural problem reported by workflow validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
}

/// A progress event for one run.
///
/// `seq` starts at 0 and increases by one per event within a run, so a
/// consumer can detect gaps after a lagging broadcast receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEvent {
    pub seq: u64,
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SkillEvent {
    /// Short type name, e.g. `node_start`.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn node_id(&self) -> Option<&str> {
        self.kind.node_id()
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The definition was rejected; nothing executed.
    ValidationError { errors: Vec<ValidationIssue> },
    NodeStart {
        node_id: String,
        node_kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<usize>,
    },
    NodeComplete {
        node_id: String,
        result: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_label: Option<String>,
    },
    NodeError {
        node_id: String,
        error_kind: String,
        message: String,
        /// True when the run continues past this error.
        recovered: bool,
    },
    SkillComplete {
        result: serde_json::Value,
        total_ms: u64,
    },
    SkillFailed { error_kind: String, message: String },
    SkillCancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_node: Option<String>,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "validation_error",
            Self::NodeStart { .. } => "node_start",
            Self::NodeComplete { .. } => "node_complete",
            Self::NodeError { .. } => "node_error",
            Self::SkillComplete { .. } => "skill_complete",
            Self::SkillFailed { .. } => "skill_failed",
            Self::SkillCancelled { .. } => "skill_cancelled",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStart { node_id, .. }
            | Self::NodeComplete { node_id, .. }
            | Self::NodeError { node_id, .. } => Some(node_id),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. }
                | Self::SkillComplete { .. }
                | Self::SkillFailed { .. }
                | Self::SkillCancelled { .. }
        )
    }
}
