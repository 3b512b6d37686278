use std::collections::HashMap;
use std::sync::Arc;

use skillflow_core::error::{Result, SkillflowError};
use skillflow_core::traits::Tool;
use skillflow_core::types::{ToolContext, ToolResult};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tools, sorted by name.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Execute a tool by name using the tool's own timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        self.execute_with_timeout(name, input, ctx, None).await
    }

    /// Execute a tool by name. `timeout_secs` overrides the tool's own timeout.
    pub async fn execute_with_timeout(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
        timeout_secs: Option<u64>,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| SkillflowError::ToolNotFound(name.to_string()))?;

        let timeout_secs = timeout_secs.unwrap_or_else(|| tool.timeout_secs());
        let timeout = std::time::Duration::from_secs(timeout_secs);

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(SkillflowError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs,
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillflow_core::types::RunId;
    use skillflow_test_utils::{SlowTool, StaticTool};

    fn ctx() -> ToolContext {
        ToolContext::new(RunId::new(), "n1")
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(StaticTool::new("search", serde_json::json!({"hits": 2})));

        let result = registry
            .execute("search", serde_json::json!({}), ctx())
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content["hits"], 2);
        assert_eq!(registry.list(), vec!["search"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, SkillflowError::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_override_applies() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool::new("slow", std::time::Duration::from_secs(10)));

        let err = registry
            .execute_with_timeout("slow", serde_json::json!({}), ctx(), Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SkillflowError::ToolTimeout { timeout_secs: 1, .. }
        ));
    }

    #[test]
    fn unregister_removes_tool() {
        let mut registry = ToolRegistry::default();
        registry.register(StaticTool::new("a", serde_json::Value::Null));
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.get("a").is_none());
    }
}
