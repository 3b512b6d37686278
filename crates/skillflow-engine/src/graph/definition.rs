use std::path::Path;

use serde::{Deserialize, Serialize};

use skillflow_core::error::{Result, SkillflowError};

use super::edge::Edge;
use super::node::Node;

/// A complete workflow definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Entry node. Inferred when exactly one node has no incoming edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    /// Node whose result becomes the run result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_terminal(mut self, terminal: impl Into<String>) -> Self {
        self.terminal = Some(terminal.into());
        self
    }

    /// Parse a JSON workflow document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SkillflowError::Definition(e.to_string()))
    }

    /// Build a graph from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| SkillflowError::Definition(e.to_string()))
    }

    /// Parse a TOML workflow document.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SkillflowError::Definition(e.to_string()))
    }

    /// Load a workflow file. `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SkillflowError::Definition(format!("cannot read {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of `id` with their index in `edges`.
    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (usize, &'a Edge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.source == id)
    }

    /// Incoming edges of `id` with their index in `edges`.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = (usize, &'a Edge)> + 'a {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.target == id)
    }
}
