use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{ToolContext, ToolResult};

/// Tool — an externally provided operation invoked by Tool nodes.
///
/// The engine trusts a tool to be safe to call; isolating what the tool
/// does is the tool's own concern.
pub trait Tool: Send + Sync + 'static {
    /// Tool name, referenced by the `tool` field of a Tool node.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    /// Execute the tool with resolved arguments.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool when the node does not set one.
    fn timeout_secs(&self) -> u64 {
        30
    }
}
