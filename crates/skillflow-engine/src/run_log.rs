use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use skillflow_core::types::{EventKind, RunId, SkillEvent};

/// How much of a run goes into its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Node errors and the terminal event only.
    Summary,
    /// Every event.
    #[default]
    Full,
}

/// JSONL run logger.
///
/// Reads a run's events from the bus and appends them, one JSON object per
/// line, to `{log_dir}/{run_id}.jsonl`. Lines are flushed as they are written,
/// so a crash leaves every earlier line intact.
pub struct RunLogger {
    log_dir: PathBuf,
    level: LogLevel,
}

impl RunLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            level: LogLevel::default(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn log_path(&self, run_id: &RunId) -> PathBuf {
        log_file(&self.log_dir, run_id)
    }

    /// Write events of `run_id` from `rx` until the run's terminal event,
    /// cancellation, or the bus closing.
    ///
    /// Subscribe before starting the run so no event is missed. Returns the
    /// log path, or `None` if the file could not be opened.
    pub async fn run(
        self,
        mut rx: broadcast::Receiver<SkillEvent>,
        run_id: RunId,
        cancel: CancellationToken,
    ) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create log directory");
            return None;
        }

        let log_path = self.log_path(&run_id);
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return None;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("RunLogger cancelled");
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            if event.run_id != run_id {
                                continue;
                            }
                            if self.wants(&event.kind) {
                                if let Ok(json) = serde_json::to_string(&event) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write log entry");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush log");
                                    }
                                }
                            }
                            if event.is_terminal() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    }
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
        Some(log_path)
    }

    fn wants(&self, kind: &EventKind) -> bool {
        match self.level {
            LogLevel::Full => true,
            LogLevel::Summary => kind.is_terminal() || matches!(kind, EventKind::NodeError { .. }),
        }
    }
}

fn log_file(dir: &Path, run_id: &RunId) -> PathBuf {
    dir.join(format!("{}.jsonl", run_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RunOptions, SkillEngine};
    use crate::graph::{Edge, Graph, Node};
    use serde_json::json;
    use skillflow_test_utils::{EchoTool, FailingTool};
    use skillflow_tools::ToolRegistry;
    use std::sync::Arc;

    fn engine() -> SkillEngine {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(FailingTool::reporting("flaky"));
        SkillEngine::new(Arc::new(registry))
    }

    fn graph() -> Graph {
        Graph::new("g")
            .with_node(Node::tool("a", "echo", json!({"x": 1})))
            .with_node(Node::tool("b", "flaky", json!({})).with_on_error(crate::graph::ErrorPolicy::Continue))
            .with_node(Node::tool("c", "echo", json!("${a.x}")))
            .with_edge(Edge::new("a", "b"))
            .with_edge(Edge::new("b", "c"))
    }

    async fn logged_run(level: LogLevel) -> (Vec<serde_json::Value>, usize) {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine();
        let opts = RunOptions::new();
        let run_id = opts.run_id.clone();

        let logger = RunLogger::new(dir.path()).with_level(level);
        let rx = engine.event_bus().subscribe();
        let task = tokio::spawn(logger.run(rx, run_id.clone(), CancellationToken::new()));

        let outcome = engine.run_with(&graph(), json!({}), opts).await;
        let path = task.await.unwrap().unwrap();
        assert_eq!(path, dir.path().join(format!("{}.jsonl", run_id)));

        let text = std::fs::read_to_string(&path).unwrap();
        let lines = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (lines, outcome.events.len())
    }

    #[tokio::test]
    async fn full_log_has_every_event() {
        let (lines, total) = logged_run(LogLevel::Full).await;
        assert_eq!(lines.len(), total);
        assert_eq!(lines[0]["type"], "node_start");
        assert_eq!(lines[0]["seq"], 0);
        assert_eq!(lines.last().unwrap()["type"], "skill_complete");
    }

    #[tokio::test]
    async fn summary_log_keeps_errors_and_end() {
        let (lines, _) = logged_run(LogLevel::Summary).await;
        let types: Vec<&str> = lines.iter().map(|l| l["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["node_error", "skill_complete"]);
        assert_eq!(lines[0]["recovered"], true);
    }

    #[tokio::test]
    async fn cancellation_stops_logger() {
        let dir = tempfile::tempdir().unwrap();
        let bus = skillflow_core::event::EventBus::new(8);
        let cancel = CancellationToken::new();
        let logger = RunLogger::new(dir.path());
        let task = tokio::spawn(logger.run(bus.subscribe(), RunId::new(), cancel.clone()));
        cancel.cancel();
        assert!(task.await.unwrap().is_some());
    }
}
