//! Skill workflow engine.
//!
//! Loads a workflow graph, validates its structure, orders it
//! deterministically and executes it node by node against a tool registry,
//! reporting progress as an ordered event stream.

pub mod condition;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod handle;
pub mod resolver;
pub mod run_log;
pub mod scheduler;
pub mod scope;
pub mod validator;

pub use condition::Condition;
pub use emitter::EventEmitter;
pub use engine::{RunFailure, RunOptions, RunOutcome, RunState, SkillEngine};
pub use error::{ExecError, ValidationError};
pub use graph::{Edge, Graph, Node, NodeKind};
pub use handle::RunHandle;
pub use run_log::{LogLevel, RunLogger};
pub use scheduler::{plan, Plan};
pub use validator::{validate, ValidatedGraph};
