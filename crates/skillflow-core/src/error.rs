use thiserror::Error;

#[derive(Debug, Error)]
pub enum SkillflowError {
    // Definition errors
    #[error("Workflow definition error: {0}")]
    Definition(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SkillflowError {
    /// Whether this error is a tool timeout (as opposed to any other tool failure).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ToolTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SkillflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display() {
        let err = SkillflowError::ToolTimeout {
            tool: "search".into(),
            timeout_secs: 5,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Tool timeout after 5s: search");
    }

    #[test]
    fn json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{oops");
        let err: SkillflowError = parse.unwrap_err().into();
        assert!(matches!(err, SkillflowError::Json(_)));
        assert!(!err.is_timeout());
    }
}
