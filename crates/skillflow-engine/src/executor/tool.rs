use serde_json::Value;
use tracing::debug;

use skillflow_core::error::SkillflowError;
use skillflow_core::types::ToolContext;
use skillflow_tools::ToolRegistry;

use crate::error::{ExecError, ValidationError};
use crate::graph::{ErrorPolicy, ToolConfig};
use crate::resolver;
use crate::scope::Lookup;

/// Calls a registered tool with resolved parameters.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    tool: String,
    params: Value,
    timeout_secs: Option<u64>,
    on_error: ErrorPolicy,
}

impl ToolExecutor {
    pub fn build(node_id: &str, cfg: &ToolConfig) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidConfig {
            node: node_id.to_string(),
            reason,
        };
        if cfg.tool.trim().is_empty() {
            return Err(invalid("tool name is empty".to_string()));
        }
        if cfg.timeout_secs == Some(0) {
            return Err(invalid("timeout_secs must be positive".to_string()));
        }
        resolver::check_template(&cfg.params).map_err(|e| invalid(format!("params: {}", e)))?;
        Ok(Self {
            tool: cfg.tool.clone(),
            params: cfg.params.clone(),
            timeout_secs: cfg.timeout_secs,
            on_error: cfg.on_error,
        })
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn on_error(&self) -> ErrorPolicy {
        self.on_error
    }

    pub fn resolve_params(&self, scope: &dyn Lookup) -> Result<Value, ExecError> {
        resolver::resolve(&self.params, scope)
    }

    /// Invoke the tool. Error results, invocation errors and unknown tools all
    /// become `ToolFailure`; an expired timeout becomes `Timeout`.
    pub async fn invoke(
        &self,
        registry: &ToolRegistry,
        args: Value,
        ctx: ToolContext,
    ) -> Result<Value, ExecError> {
        debug!(tool = %self.tool, node_id = %ctx.node_id, "Invoking tool");
        match registry
            .execute_with_timeout(&self.tool, args, ctx, self.timeout_secs)
            .await
        {
            Ok(result) if result.is_error => Err(ExecError::ToolFailure {
                tool: self.tool.clone(),
                message: result.error_message(),
            }),
            Ok(result) => Ok(result.content),
            Err(SkillflowError::ToolTimeout { tool, timeout_secs }) => {
                Err(ExecError::Timeout { tool, timeout_secs })
            }
            Err(e) => Err(ExecError::ToolFailure {
                tool: self.tool.clone(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillflow_core::types::RunId;
    use skillflow_test_utils::{EchoTool, FailingTool, SlowTool};
    use std::time::Duration;

    fn cfg(tool: &str, params: Value) -> ToolConfig {
        ToolConfig {
            tool: tool.into(),
            params,
            timeout_secs: None,
            on_error: ErrorPolicy::Abort,
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(RunId::from_str("r"), "n")
    }

    #[test]
    fn build_rejects_bad_config() {
        assert!(ToolExecutor::build("n", &cfg("", json!({}))).is_err());
        assert!(ToolExecutor::build("n", &cfg("echo", json!({"q": "${bad path}"}))).is_err());
        let mut zero = cfg("echo", json!({}));
        zero.timeout_secs = Some(0);
        assert!(matches!(
            ToolExecutor::build("n", &zero),
            Err(ValidationError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn invoke_returns_content() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let exec = ToolExecutor::build("n", &cfg("echo", json!({}))).unwrap();
        let out = exec.invoke(&registry, json!({"a": 1}), ctx()).await.unwrap();
        assert_eq!(out, json!({"a": 1}));
    }

    #[tokio::test]
    async fn failures_map_to_tool_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool::reporting("soft"));
        registry.register(FailingTool::raising("hard"));

        for name in ["soft", "hard", "missing"] {
            let exec = ToolExecutor::build("n", &cfg(name, json!({}))).unwrap();
            let err = exec.invoke(&registry, json!({}), ctx()).await.unwrap_err();
            assert_eq!(err.kind(), "tool_failure", "tool {}", name);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn node_timeout_overrides_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool::new("slow", Duration::from_secs(60)));
        let mut c = cfg("slow", json!({}));
        c.timeout_secs = Some(2);
        let exec = ToolExecutor::build("n", &c).unwrap();
        let err = exec.invoke(&registry, json!({}), ctx()).await.unwrap_err();
        assert_eq!(
            err,
            ExecError::Timeout {
                tool: "slow".into(),
                timeout_secs: 2
            }
        );
    }
}
