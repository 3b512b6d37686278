use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use skillflow_core::event::EventBus;
use skillflow_core::types::{EventKind, RunId, SkillEvent};

/// Append-only event log for one run.
///
/// Every event gets the next sequence number, is kept for the run outcome,
/// and is forwarded as it happens to the broadcast bus and to an optional
/// lossless channel.
pub struct EventEmitter {
    run_id: RunId,
    next_seq: u64,
    events: Vec<SkillEvent>,
    bus: Option<Arc<EventBus>>,
    sink: Option<mpsc::UnboundedSender<SkillEvent>>,
}

impl EventEmitter {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            next_seq: 0,
            events: Vec::new(),
            bus: None,
            sink: None,
        }
    }

    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_sink(mut self, sink: Option<mpsc::UnboundedSender<SkillEvent>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn emit(&mut self, kind: EventKind, duration: Option<Duration>) {
        let event = SkillEvent {
            seq: self.next_seq,
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            duration_ms: duration.map(|d| d.as_millis() as u64),
            kind,
        };
        self.next_seq += 1;

        if let Some(bus) = &self.bus {
            bus.publish(event.clone());
        }
        if let Some(sink) = &self.sink {
            // The receiver may be gone; the run goes on regardless
            let _ = sink.send(event.clone());
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[SkillEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SkillEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(id: &str) -> EventKind {
        EventKind::NodeStart {
            node_id: id.into(),
            node_kind: "tool".into(),
            iteration: None,
        }
    }

    #[tokio::test]
    async fn sequence_numbers_and_fanout() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let (tx, mut sink_rx) = mpsc::unbounded_channel();

        let mut emitter = EventEmitter::new(RunId::from_str("r1"))
            .with_bus(bus)
            .with_sink(Some(tx));
        emitter.emit(start("a"), None);
        emitter.emit(start("b"), Some(Duration::from_millis(15)));

        let seqs: Vec<u64> = emitter.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(emitter.events()[1].duration_ms, Some(15));

        assert_eq!(rx.recv().await.unwrap().node_id(), Some("a"));
        assert_eq!(sink_rx.recv().await.unwrap().node_id(), Some("a"));
        assert_eq!(sink_rx.recv().await.unwrap().seq, 1);
        assert_eq!(emitter.run_id().0, "r1");
    }

    #[test]
    fn dropped_sink_is_ignored() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut emitter = EventEmitter::new(RunId::new()).with_sink(Some(tx));
        emitter.emit(start("a"), None);
        assert_eq!(emitter.into_events().len(), 1);
    }
}
