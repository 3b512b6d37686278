//! Stub tools for exercising the engine without real tool backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use skillflow_core::error::{Result, SkillflowError};
use skillflow_core::traits::Tool;
use skillflow_core::types::{ToolContext, ToolResult};

/// Always returns the same value.
pub struct StaticTool {
    name: String,
    output: serde_json::Value,
}

impl StaticTool {
    pub fn new(name: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            output,
        }
    }
}

impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed value"
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        let output = self.output.clone();
        Box::pin(async move { Ok(ToolResult::success(output)) })
    }
}

/// Echoes its input back as the result.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns its input"
    }

    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move { Ok(ToolResult::success(input)) })
    }
}

/// Fails every call, either with an error result or with an invocation error.
pub struct FailingTool {
    name: String,
    as_result: bool,
}

impl FailingTool {
    /// Fails by returning a `ToolResult` with `is_error = true`.
    pub fn reporting(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            as_result: true,
        }
    }

    /// Fails by returning `Err(ToolExecution)`.
    pub fn raising(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            as_result: false,
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        let name = self.name.clone();
        let as_result = self.as_result;
        Box::pin(async move {
            if as_result {
                Ok(ToolResult::error("stub failure"))
            } else {
                Err(SkillflowError::ToolExecution {
                    tool: name,
                    message: "stub failure".into(),
                })
            }
        })
    }
}

/// Sleeps before returning `null`; pair with paused tokio time.
pub struct SlowTool {
    name: String,
    delay: Duration,
}

impl SlowTool {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps before answering"
    }

    fn execute(&self, _input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(ToolResult::success(serde_json::Value::Null))
        })
    }
}

/// Records every input it receives and answers with a closure.
pub struct RecordingTool {
    name: String,
    calls: Arc<Mutex<Vec<serde_json::Value>>>,
    respond: Box<dyn Fn(&serde_json::Value) -> serde_json::Value + Send + Sync>,
}

impl RecordingTool {
    pub fn new(
        name: impl Into<String>,
        respond: impl Fn(&serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(Mutex::new(Vec::new())),
            respond: Box::new(respond),
        }
    }

    /// Shared handle to the recorded inputs.
    pub fn calls(&self) -> Arc<Mutex<Vec<serde_json::Value>>> {
        self.calls.clone()
    }
}

impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records inputs"
    }

    fn execute(&self, input: serde_json::Value, _ctx: ToolContext) -> BoxFuture<'_, Result<ToolResult>> {
        let output = (self.respond)(&input);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(input);
        }
        Box::pin(async move { Ok(ToolResult::success(output)) })
    }
}
