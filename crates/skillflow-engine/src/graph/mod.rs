//! Workflow graph model.
//!
//! A workflow is a set of `Node`s (tool, decision, loop, merge, transform)
//! connected by `Edge`s. The graph is parsed once from JSON or TOML and is
//! immutable for the duration of a run; validation and planning work on
//! borrowed views of it.

pub mod definition;
pub mod edge;
pub mod node;

pub use definition::Graph;
pub use edge::{Edge, LABEL_BODY, LABEL_EXIT, LABEL_FALSE, LABEL_TRUE};
pub use node::{
    DecisionConfig, ErrorPolicy, LoopConfig, MergeConfig, Node, NodeConfig, NodeKind, ToolConfig,
    TransformConfig,
};
