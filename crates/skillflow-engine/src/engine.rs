//! Run orchestration.
//!
//! A run moves through validating → planning → running and ends in exactly
//! one of completed, failed or cancelled. Every step is reported through the
//! run's [`EventEmitter`]; the full event list is returned with the outcome.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use skillflow_core::config::ExecutionConfig;
use skillflow_core::event::EventBus;
use skillflow_core::types::{EventKind, RunId, SkillEvent, ToolContext};
use skillflow_tools::ToolRegistry;

use crate::emitter::EventEmitter;
use crate::error::{ExecError, ValidationError};
use crate::executor::{LoopExecutor, NodeExecutor, NodeOutput};
use crate::graph::Graph;
use crate::handle::RunHandle;
use crate::scheduler::{self, Plan};
use crate::scope::{ScopeArena, ScopeId};
use crate::validator::{self, ValidatedGraph};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Validating,
    Planning,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Planning => "planning",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RunFailure {
    /// The definition was rejected before anything ran.
    Invalid(Vec<ValidationError>),
    /// A node failed and its error was not recoverable.
    Node { node_id: String, error: ExecError },
    /// The run as a whole failed (run timeout).
    Run(ExecError),
}

impl RunFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "validation_error",
            Self::Node { error, .. } | Self::Run(error) => error.kind(),
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Node { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(errors) => {
                let msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                write!(f, "invalid workflow: {}", msgs.join("; "))
            }
            Self::Node { node_id, error } => write!(f, "node '{}': {}", node_id, error),
            Self::Run(error) => write!(f, "{}", error),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub state: RunState,
    /// Terminal result; `null` unless the run completed.
    pub result: Value,
    /// Top-level context at the end of the run: `input` plus every
    /// top-level node result.
    pub context: Map<String, Value>,
    pub events: Vec<SkillEvent>,
    pub failure: Option<RunFailure>,
    pub total_ms: u64,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Event type names in order, e.g. `["node_start", "node_complete", ...]`.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.type_name()).collect()
    }

    /// Ids of nodes that emitted `node_start`, in order.
    pub fn started_nodes(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::NodeStart { .. }))
            .filter_map(|e| e.node_id())
            .collect()
    }
}

/// Per-run options. The defaults give a fresh run id and a token nobody else holds.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub run_id: RunId,
    pub cancel: CancellationToken,
    /// Lossless copy of every event, in addition to the broadcast bus.
    pub sink: Option<mpsc::UnboundedSender<SkillEvent>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Executes workflow graphs against a tool registry.
#[derive(Clone)]
pub struct SkillEngine {
    tools: Arc<ToolRegistry>,
    config: ExecutionConfig,
    bus: Arc<EventBus>,
}

impl SkillEngine {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        let config = ExecutionConfig::default();
        let bus = Arc::new(EventBus::new(config.event_buffer));
        Self { tools, config, bus }
    }

    /// Replace the execution config. Also resizes the event bus, dropping
    /// existing subscribers.
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.bus = Arc::new(EventBus::new(config.event_buffer));
        self.config = config;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Validate and run `graph` to completion.
    pub async fn run(&self, graph: &Graph, input: Value) -> RunOutcome {
        self.run_with(graph, input, RunOptions::default()).await
    }

    /// Run on a background task. The handle can cancel the run, stream its
    /// events and await the outcome.
    pub fn spawn(&self, graph: Graph, input: Value) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let opts = RunOptions {
            sink: Some(tx),
            ..RunOptions::default()
        };
        let run_id = opts.run_id.clone();
        let cancel = opts.cancel.clone();
        let engine = self.clone();
        let task = tokio::spawn(async move { engine.run_with(&graph, input, opts).await });
        RunHandle::new(run_id, cancel, rx, self.bus.clone(), task)
    }

    pub async fn run_with(&self, graph: &Graph, input: Value, opts: RunOptions) -> RunOutcome {
        let started = Instant::now();
        let run_id = opts.run_id;
        let mut emitter = EventEmitter::new(run_id.clone())
            .with_bus(self.bus.clone())
            .with_sink(opts.sink);

        info!(run_id = %run_id, graph = %graph.id, state = %RunState::Validating, "Run started");
        let validated = match validator::validate(graph) {
            Ok(v) => v,
            Err(errors) => {
                warn!(run_id = %run_id, errors = errors.len(), "Workflow rejected");
                emitter.emit(
                    EventKind::ValidationError {
                        errors: errors.iter().map(ValidationError::to_issue).collect(),
                    },
                    None,
                );
                let mut context = Map::new();
                context.insert("input".to_string(), input);
                return RunOutcome {
                    run_id,
                    state: RunState::Failed,
                    result: Value::Null,
                    context,
                    events: emitter.into_events(),
                    failure: Some(RunFailure::Invalid(errors)),
                    total_ms: started.elapsed().as_millis() as u64,
                };
            }
        };

        debug!(run_id = %run_id, state = %RunState::Planning, "Planning");
        let plan = scheduler::plan(&validated);

        debug!(run_id = %run_id, state = %RunState::Running, nodes = plan.len(), "Executing");
        let budget = self.config.max_run_duration_secs;
        let mut run = Run {
            engine: self,
            graph: &validated,
            plan: &plan,
            arena: ScopeArena::new(input),
            emitter,
            cancel: opts.cancel,
            deadline: (budget > 0).then(|| started + Duration::from_secs(budget)),
            budget_secs: budget,
        };
        let root = run.arena.root();
        let outcome = run.run_sequence(plan.order(), root, Frame::default(), None).await;

        let Run {
            arena, mut emitter, ..
        } = run;
        let total_ms = started.elapsed().as_millis() as u64;

        let (state, result, failure) = match outcome {
            Ok(frame) => {
                let result = terminal_result(&validated, &frame, &arena, root);
                emitter.emit(
                    EventKind::SkillComplete {
                        result: result.clone(),
                        total_ms,
                    },
                    Some(started.elapsed()),
                );
                info!(run_id = %run_id, total_ms, "Run completed");
                (RunState::Completed, result, None)
            }
            Err(Halt::Failed(failure)) => {
                emitter.emit(
                    EventKind::SkillFailed {
                        error_kind: failure.kind().to_string(),
                        message: failure.to_string(),
                    },
                    Some(started.elapsed()),
                );
                error!(run_id = %run_id, error = %failure, "Run failed");
                (RunState::Failed, Value::Null, Some(failure))
            }
            Err(Halt::Cancelled(at_node)) => {
                emitter.emit(
                    EventKind::SkillCancelled {
                        at_node: at_node.clone(),
                    },
                    Some(started.elapsed()),
                );
                info!(run_id = %run_id, at_node = ?at_node, "Run cancelled");
                (RunState::Cancelled, Value::Null, None)
            }
        };

        RunOutcome {
            run_id,
            state,
            result,
            context: arena.into_root(),
            events: emitter.into_events(),
            failure,
            total_ms,
        }
    }
}

/// `terminal` if it ran, else the last top-level node that ran.
fn terminal_result(graph: &ValidatedGraph, frame: &Frame, arena: &ScopeArena, root: ScopeId) -> Value {
    let declared = graph
        .graph()
        .terminal
        .as_deref()
        .filter(|t| frame.executed.contains(*t));
    declared
        .or(frame.last.as_deref())
        .and_then(|id| arena.get(root, id))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Why execution stopped early.
enum Halt {
    Failed(RunFailure),
    Cancelled(Option<String>),
}

/// What has run in the current sequence: executed nodes, the label each
/// decision took, and the most recent node.
#[derive(Debug, Clone, Default)]
struct Frame {
    executed: HashSet<String>,
    taken: HashMap<String, String>,
    last: Option<String>,
}

struct Run<'a> {
    engine: &'a SkillEngine,
    graph: &'a ValidatedGraph,
    plan: &'a Plan,
    arena: ScopeArena,
    emitter: EventEmitter,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    budget_secs: u64,
}

impl<'a> Run<'a> {
    /// Execute `order` in `scope`. Loop nodes recurse into their body plan.
    fn run_sequence<'s>(
        &'s mut self,
        order: &'a [String],
        scope: ScopeId,
        mut frame: Frame,
        iteration: Option<usize>,
    ) -> BoxFuture<'s, Result<Frame, Halt>> {
        Box::pin(async move {
            let graph = self.graph;
            for node_id in order {
                let Some(exec) = graph.executor(node_id) else {
                    continue;
                };
                if !is_live(graph, node_id, &frame) {
                    debug!(node_id = %node_id, "Branch not taken, skipping");
                    continue;
                }
                self.checkpoint(node_id)?;

                let output = self.run_node(node_id, exec, scope, &frame, iteration).await?;
                if let Some(label) = output.next_label {
                    frame.taken.insert(node_id.clone(), label);
                }
                self.arena.set(scope, node_id.clone(), output.result);
                frame.executed.insert(node_id.clone());
                frame.last = Some(node_id.clone());
            }
            Ok(frame)
        })
    }

    /// Cancellation and run-timeout check, done before every node.
    fn checkpoint(&self, node_id: &str) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled(Some(node_id.to_string())));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Halt::Failed(RunFailure::Run(ExecError::RunTimeout(
                    self.budget_secs,
                ))));
            }
        }
        Ok(())
    }

    async fn run_node(
        &mut self,
        node_id: &str,
        exec: &'a NodeExecutor,
        scope: ScopeId,
        frame: &Frame,
        iteration: Option<usize>,
    ) -> Result<NodeOutput, Halt> {
        debug!(node_id = %node_id, kind = %exec.kind(), iteration = ?iteration, "Node start");
        self.emitter.emit(
            EventKind::NodeStart {
                node_id: node_id.to_string(),
                node_kind: exec.kind().as_str().to_string(),
                iteration,
            },
            None,
        );
        let started = Instant::now();

        let outcome = match exec {
            NodeExecutor::Tool(tool) => {
                let args = tool.resolve_params(&self.arena.view(scope));
                match args {
                    Ok(args) => {
                        let ctx = ToolContext::new(self.emitter.run_id().clone(), node_id);
                        tool.invoke(&self.engine.tools, args, ctx)
                            .await
                            .map(NodeOutput::value)
                    }
                    Err(e) => Err(e),
                }
            }
            NodeExecutor::Decision(decision) => decision.execute(&self.arena.view(scope)),
            NodeExecutor::Merge(merge) => merge.execute(&self.arena.view(scope)).map(NodeOutput::value),
            NodeExecutor::Transform(transform) => {
                transform.execute(&self.arena.view(scope)).map(NodeOutput::value)
            }
            NodeExecutor::Loop(lp) => match self.run_loop(node_id, lp, scope, frame).await {
                Ok(value) => Ok(NodeOutput::value(value)),
                Err(LoopError::Halt(halt)) => return Err(halt),
                Err(LoopError::Node(e)) => Err(e),
            },
        };

        match outcome {
            Ok(output) => {
                debug!(node_id = %node_id, next_label = ?output.next_label, "Node complete");
                self.emitter.emit(
                    EventKind::NodeComplete {
                        node_id: node_id.to_string(),
                        result: output.result.clone(),
                        next_label: output.next_label.clone(),
                    },
                    Some(started.elapsed()),
                );
                Ok(output)
            }
            Err(err) => {
                let recovered = exec.recovery(&err);
                self.emitter.emit(
                    EventKind::NodeError {
                        node_id: node_id.to_string(),
                        error_kind: err.kind().to_string(),
                        message: err.to_string(),
                        recovered: recovered.is_some(),
                    },
                    Some(started.elapsed()),
                );
                match recovered {
                    Some(value) => {
                        warn!(node_id = %node_id, error = %err, "Node failed, continuing");
                        Ok(NodeOutput::value(value))
                    }
                    None => {
                        error!(node_id = %node_id, error = %err, "Node failed");
                        Err(Halt::Failed(RunFailure::Node {
                            node_id: node_id.to_string(),
                            error: err,
                        }))
                    }
                }
            }
        }
    }

    /// Run the body once per element of the loop's source, collecting each
    /// iteration's result.
    async fn run_loop(
        &mut self,
        loop_id: &str,
        lp: &'a LoopExecutor,
        scope: ScopeId,
        frame: &Frame,
    ) -> Result<Value, LoopError> {
        let items = lp.items(&self.arena.view(scope)).map_err(LoopError::Node)?;
        let limit = lp.limit(self.engine.config.default_max_iterations);
        let plan = self.plan;
        let body = plan.body(loop_id);
        debug!(loop_id = %loop_id, items = items.len(), limit, "Loop start");

        let mut collected = Vec::with_capacity(items.len().min(limit));
        for (index, item) in items.into_iter().enumerate() {
            if index >= limit {
                return Err(LoopError::Node(ExecError::LoopLimitExceeded { max: limit }));
            }
            let child = lp.enter(&mut self.arena, scope, index, item);
            let mut iteration = frame.clone();
            iteration.executed.insert(loop_id.to_string());
            iteration.last = None;

            let finished = self.run_sequence(body, child, iteration, Some(index)).await;
            let value = finished.map(|f| {
                f.last
                    .and_then(|id| self.arena.get(child, &id).cloned())
                    .unwrap_or(Value::Null)
            });
            self.arena.release(child);
            collected.push(value.map_err(LoopError::Halt)?);
        }
        Ok(Value::Array(collected))
    }
}

enum LoopError {
    /// The loop node itself failed.
    Node(ExecError),
    /// Something inside the body stopped the run; already reported.
    Halt(Halt),
}

/// A node runs when it has no dependencies (the entry) or when at least one
/// incoming edge comes from a node that ran and, for decisions, carries the
/// label that was taken.
fn is_live(graph: &ValidatedGraph, node_id: &str, frame: &Frame) -> bool {
    let mut incoming = graph.incoming(node_id).peekable();
    if incoming.peek().is_none() {
        return true;
    }
    incoming.any(|edge| {
        frame.executed.contains(&edge.source)
            && match frame.taken.get(&edge.source) {
                Some(label) => edge.label() == Some(label.as_str()),
                None => true,
            }
    })
}
