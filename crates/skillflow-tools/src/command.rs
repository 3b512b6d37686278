use std::path::PathBuf;

use futures::future::BoxFuture;
use tracing::debug;

use skillflow_core::error::{Result, SkillflowError};
use skillflow_core::traits::Tool;
use skillflow_core::types::{ToolContext, ToolResult};

use crate::manifest::ToolManifest;

/// A tool backed by a shell command from a tool manifest.
///
/// The resolved arguments are written to the command's stdin as JSON.
/// Stdout is parsed as JSON when possible, otherwise returned as a string.
pub struct CommandTool {
    manifest: ToolManifest,
    tool_dir: PathBuf,
    schema: serde_json::Value,
}

impl CommandTool {
    pub fn new(manifest: ToolManifest, tool_dir: PathBuf) -> Result<Self> {
        let schema: serde_json::Value =
            serde_json::from_str(&manifest.input_schema_json).map_err(|e| {
                SkillflowError::Config(format!(
                    "Invalid input_schema_json for tool '{}': {}",
                    manifest.name, e
                ))
            })?;

        Ok(Self {
            manifest,
            tool_dir,
            schema,
        })
    }
}

impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        let command = self
            .manifest
            .command
            .replace("$TOOL_DIR", &self.tool_dir.display().to_string());
        let name = self.manifest.name.clone();
        let working_dir = ctx.working_dir.clone();

        Box::pin(async move {
            let input_bytes = serde_json::to_vec(&input)?;
            debug!(tool = %name, command = %command, node_id = %ctx.node_id, "Executing command tool");

            let mut cmd = if cfg!(windows) {
                let mut c = tokio::process::Command::new("cmd");
                c.arg("/C").arg(&command);
                c
            } else {
                let mut c = tokio::process::Command::new("bash");
                c.arg("-c").arg(&command);
                c
            };
            let mut child = cmd
                .current_dir(&working_dir)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| SkillflowError::ToolExecution {
                    tool: name.clone(),
                    message: e.to_string(),
                })?;

            // Write JSON input to stdin
            if let Some(mut stdin) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                stdin.write_all(&input_bytes).await.ok();
                // Drop stdin to close it so the child can read EOF
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| SkillflowError::ToolExecution {
                    tool: name.clone(),
                    message: e.to_string(),
                })?;

            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();

            if output.status.success() {
                let content = serde_json::from_str(&stdout)
                    .unwrap_or(serde_json::Value::String(stdout));
                Ok(ToolResult::success(content))
            } else {
                let msg = if stderr.is_empty() { stdout } else { stderr };
                Ok(ToolResult::error(format!(
                    "Exit code {}\n{}",
                    output.status.code().unwrap_or(-1),
                    msg
                )))
            }
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.manifest.timeout_secs
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use skillflow_core::types::RunId;

    fn test_ctx() -> ToolContext {
        ToolContext {
            run_id: RunId::new(),
            node_id: "n1".into(),
            working_dir: std::env::temp_dir(),
        }
    }

    fn manifest(name: &str, command: &str) -> ToolManifest {
        ToolManifest {
            name: name.into(),
            description: "test".into(),
            command: command.into(),
            timeout_secs: 5,
            input_schema_json: r#"{"type":"object"}"#.into(),
            prerequisites: Default::default(),
        }
    }

    #[tokio::test]
    async fn command_tool_echoes_json() {
        let tool = CommandTool::new(manifest("echo", "cat"), std::env::temp_dir()).unwrap();
        let input = serde_json::json!({"text": "hello"});
        let result = tool.execute(input.clone(), test_ctx()).await.unwrap();
        assert!(!result.is_error);
        // cat echoes back the JSON input, which parses as JSON again
        assert_eq!(result.content, input);
    }

    #[tokio::test]
    async fn command_tool_plain_text_output() {
        let tool =
            CommandTool::new(manifest("hi", "echo hello world"), std::env::temp_dir()).unwrap();
        let result = tool.execute(serde_json::json!({}), test_ctx()).await.unwrap();
        assert_eq!(result.content, serde_json::json!("hello world"));
    }

    #[tokio::test]
    async fn command_tool_failure() {
        let tool = CommandTool::new(manifest("fail", "exit 42"), std::env::temp_dir()).unwrap();
        let result = tool.execute(serde_json::json!({}), test_ctx()).await.unwrap();
        assert!(result.is_error);
        assert!(result.error_message().contains("Exit code 42"));
    }

    #[test]
    fn invalid_schema_rejected() {
        let mut m = manifest("bad", "true");
        m.input_schema_json = "{not json".into();
        assert!(matches!(
            CommandTool::new(m, std::env::temp_dir()),
            Err(SkillflowError::Config(_))
        ));
    }
}
