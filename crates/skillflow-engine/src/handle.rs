use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use skillflow_core::event::EventBus;
use skillflow_core::types::{RunId, SkillEvent};

use crate::engine::RunOutcome;

/// Control over a run executing on a background task.
pub struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<SkillEvent>,
    bus: Arc<EventBus>,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    pub(crate) fn new(
        run_id: RunId,
        cancel: CancellationToken,
        events: mpsc::UnboundedReceiver<SkillEvent>,
        bus: Arc<EventBus>,
        task: JoinHandle<RunOutcome>,
    ) -> Self {
        Self {
            run_id,
            cancel,
            events,
            bus,
            task,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Request cancellation. Takes effect before the next node starts; a tool
    /// call already in flight finishes first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Broadcast subscription to the engine's bus. Sees events of every run
    /// on that engine, from the moment of subscribing on.
    pub fn subscribe(&self) -> broadcast::Receiver<SkillEvent> {
        self.bus.subscribe()
    }

    /// Next event of this run, without loss. `None` once the run has finished
    /// and every event has been read.
    pub async fn next_event(&mut self) -> Option<SkillEvent> {
        self.events.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> Result<RunOutcome, JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RunState, SkillEngine};
    use crate::graph::{Edge, Graph, Node};
    use serde_json::json;
    use skillflow_test_utils::{EchoTool, SlowTool};
    use skillflow_tools::ToolRegistry;
    use std::time::Duration;

    fn engine() -> SkillEngine {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(SlowTool::new("slow", Duration::from_secs(5)));
        SkillEngine::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn events_stream_then_outcome() {
        let graph = Graph::new("g")
            .with_node(Node::tool("a", "echo", json!("${input}")))
            .with_node(Node::tool("b", "echo", json!("${a}")))
            .with_edge(Edge::new("a", "b"));
        let mut handle = engine().spawn(graph, json!(7));

        let mut types = Vec::new();
        while let Some(event) = handle.next_event().await {
            assert_eq!(&event.run_id, handle.run_id());
            types.push(event.type_name());
        }
        assert_eq!(types.last(), Some(&"skill_complete"));
        assert_eq!(types.len(), 5);

        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.result, json!(7));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_at_next_node() {
        let graph = Graph::new("g")
            .with_node(Node::tool("a", "slow", json!({})))
            .with_node(Node::tool("b", "echo", json!({})))
            .with_edge(Edge::new("a", "b"));
        let mut handle = engine().spawn(graph, json!(null));

        // Wait until the slow tool is running, then cancel.
        let first = handle.next_event().await.unwrap();
        assert_eq!(first.type_name(), "node_start");
        handle.cancel();

        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.state, RunState::Cancelled);
        assert_eq!(
            outcome.event_types(),
            vec!["node_start", "node_complete", "skill_cancelled"]
        );
        let last = outcome.events.last().unwrap();
        assert_eq!(
            last.kind,
            skillflow_core::types::EventKind::SkillCancelled {
                at_node: Some("b".into())
            }
        );
    }
}
