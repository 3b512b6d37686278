//! Structural validation.
//!
//! Runs every check over the whole graph and reports all problems at once.
//! A graph that passes comes back as a `ValidatedGraph`: the original
//! definition plus the analysis the scheduler and engine rely on (entry node,
//! loop bodies, loop-back edges, prepared executors).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::error::ValidationError;
use crate::executor::NodeExecutor;
use crate::graph::{Edge, Graph, Node, NodeKind, LABEL_BODY, LABEL_EXIT};
use crate::scheduler;

/// Nodes executed once per iteration of a Loop node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopBody {
    /// Target of the loop's `body` edge.
    pub entry: String,
    /// Target of the loop's `exit` edge, if any.
    pub exit: Option<String>,
    /// Every node in the body, nested loop bodies included.
    pub members: BTreeSet<String>,
}

/// A graph that passed validation, with its structural analysis.
#[derive(Debug, Clone)]
pub struct ValidatedGraph {
    graph: Arc<Graph>,
    index: HashMap<String, usize>,
    entry: String,
    loop_back: HashSet<usize>,
    loops: HashMap<String, LoopBody>,
    owner: HashMap<String, String>,
    executors: HashMap<String, NodeExecutor>,
}

impl ValidatedGraph {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.graph.nodes[i])
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.nodes.iter().map(|n| n.id.as_str())
    }

    pub fn executor(&self, id: &str) -> Option<&NodeExecutor> {
        self.executors.get(id)
    }

    pub fn is_loop_back(&self, edge_index: usize) -> bool {
        self.loop_back.contains(&edge_index)
    }

    /// Edges that loop bodies use to return to their loop, by index.
    pub fn loop_back_edges(&self) -> impl Iterator<Item = &Edge> {
        let mut indices: Vec<_> = self.loop_back.iter().copied().collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| &self.graph.edges[i])
    }

    pub fn loop_body(&self, loop_id: &str) -> Option<&LoopBody> {
        self.loops.get(loop_id)
    }

    pub fn loop_ids(&self) -> impl Iterator<Item = &str> {
        self.loops.keys().map(String::as_str)
    }

    /// The innermost loop whose body contains `id`, or `None` for top-level nodes.
    pub fn owner(&self, id: &str) -> Option<&str> {
        self.owner.get(id).map(String::as_str)
    }

    pub(crate) fn owners(&self) -> &HashMap<String, String> {
        &self.owner
    }

    /// Edges that order execution: every edge except loop-back edges.
    pub fn dependency_edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph
            .edges
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.loop_back.contains(i))
            .map(|(_, e)| e)
    }

    /// Incoming dependency edges of `id`.
    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.graph
            .incoming(id)
            .filter(|(i, _)| !self.loop_back.contains(i))
            .map(|(_, e)| e)
    }
}

/// Validate a graph, collecting every structural error.
pub fn validate(graph: &Graph) -> Result<ValidatedGraph, Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Node index and duplicate ids
    let mut index = HashMap::new();
    let mut duplicates = BTreeSet::new();
    for (i, node) in graph.nodes.iter().enumerate() {
        if index.insert(node.id.clone(), i).is_some() {
            duplicates.insert(node.id.clone());
        }
    }
    errors.extend(duplicates.into_iter().map(ValidationError::DuplicateNode));

    // Dangling edges; the rest of validation only looks at edges between known nodes
    let mut valid: Vec<usize> = Vec::with_capacity(graph.edges.len());
    for (i, edge) in graph.edges.iter().enumerate() {
        let missing = [&edge.source, &edge.target]
            .into_iter()
            .find(|id| !index.contains_key(id.as_str()));
        match missing {
            Some(id) => errors.push(ValidationError::DanglingEdge {
                index: i,
                from: edge.source.clone(),
                to: edge.target.clone(),
                missing: id.clone(),
            }),
            None => valid.push(i),
        }
    }
    let outgoing = |id: &str| {
        valid
            .iter()
            .map(|&i| (i, &graph.edges[i]))
            .filter(move |(_, e)| e.source == id)
            .collect::<Vec<_>>()
    };

    // Node configs
    let mut executors = HashMap::new();
    for node in &graph.nodes {
        match NodeExecutor::build(node) {
            Ok(exec) => {
                executors.insert(node.id.clone(), exec);
            }
            Err(e) => errors.push(e),
        }
    }

    // Edge labels of control-flow nodes
    let mut body_entries: Vec<(String, String, Option<String>)> = Vec::new();
    for node in &graph.nodes {
        let out = outgoing(&node.id);
        match node.kind() {
            NodeKind::Decision => {
                let mut labels: Vec<String> = out
                    .iter()
                    .map(|(_, e)| e.label().unwrap_or("<none>").to_string())
                    .collect();
                labels.sort();
                if labels != ["false", "true"] {
                    errors.push(ValidationError::DecisionArity {
                        node: node.id.clone(),
                        labels,
                    });
                }
            }
            NodeKind::Loop => {
                let body: Vec<_> = out.iter().filter(|(_, e)| e.has_label(LABEL_BODY)).collect();
                let exit: Vec<_> = out.iter().filter(|(_, e)| e.has_label(LABEL_EXIT)).collect();
                let structure = |reason: String| ValidationError::LoopStructure {
                    node: node.id.clone(),
                    reason,
                };
                if body.len() != 1 {
                    errors.push(structure(format!(
                        "needs exactly one \"body\" edge, found {}",
                        body.len()
                    )));
                } else if exit.len() > 1 {
                    errors.push(structure(format!(
                        "has {} \"exit\" edges, at most one is allowed",
                        exit.len()
                    )));
                } else if body.len() + exit.len() != out.len() {
                    errors.push(structure(
                        "outgoing edges must be labeled \"body\" or \"exit\"".to_string(),
                    ));
                } else if body[0].1.target == node.id {
                    errors.push(structure("body edge points back at the loop".to_string()));
                } else {
                    body_entries.push((
                        node.id.clone(),
                        body[0].1.target.clone(),
                        exit.first().map(|(_, e)| e.target.clone()),
                    ));
                }
            }
            _ => {}
        }
    }

    // Loop bodies and loop-back edges
    let mut loops = HashMap::new();
    let mut loop_back = HashSet::new();
    for (loop_id, entry, exit) in &body_entries {
        let mut members = BTreeSet::new();
        let mut queue = VecDeque::from([entry.as_str()]);
        members.insert(entry.to_string());
        while let Some(current) = queue.pop_front() {
            for (i, edge) in outgoing(current) {
                let target = edge.target.as_str();
                if target == loop_id.as_str() || target == entry.as_str() {
                    loop_back.insert(i);
                } else if members.insert(target.to_string()) {
                    queue.push_back(target);
                }
            }
        }
        if let Some(exit) = exit.as_ref().filter(|x| members.contains(*x)) {
            errors.push(ValidationError::LoopStructure {
                node: loop_id.clone(),
                reason: format!("body reaches the exit node '{}'", exit),
            });
            continue;
        }
        debug!(loop_id = %loop_id, entry = %entry, members = members.len(), "Loop body resolved");
        loops.insert(
            loop_id.clone(),
            LoopBody {
                entry: entry.clone(),
                exit: exit.clone(),
                members,
            },
        );
    }
    let mut loop_ids: Vec<&String> = loops.keys().collect();
    loop_ids.sort();
    for (i, a) in loop_ids.iter().enumerate() {
        for b in &loop_ids[i + 1..] {
            let (ma, mb) = (&loops[*a].members, &loops[*b].members);
            if !ma.is_disjoint(mb) && !ma.is_subset(mb) && !mb.is_subset(ma) {
                errors.push(ValidationError::LoopStructure {
                    node: (*b).clone(),
                    reason: format!("body overlaps the body of loop '{}'", a),
                });
            }
        }
    }
    let owner = innermost_owners(&loops);

    // Entry point
    let has_incoming: HashSet<&str> = valid
        .iter()
        .filter(|&&i| !loop_back.contains(&i))
        .map(|&i| graph.edges[i].target.as_str())
        .collect();
    let has_outgoing: HashSet<&str> = valid
        .iter()
        .map(|&i| graph.edges[i].source.as_str())
        .collect();
    let roots: Vec<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| !has_incoming.contains(id))
        .collect();

    let mut entry = None;
    match &graph.entry {
        Some(declared) if !index.contains_key(declared) => {
            errors.push(ValidationError::MissingEntry(format!(
                "declared entry '{}' is not a node",
                declared
            )));
        }
        Some(declared) if has_incoming.contains(declared.as_str()) => {
            errors.push(ValidationError::MissingEntry(format!(
                "declared entry '{}' has incoming edges",
                declared
            )));
        }
        Some(declared) => {
            entry = Some(declared.clone());
            errors.extend(
                roots
                    .iter()
                    .filter(|r| **r != declared.as_str())
                    .map(|r| ValidationError::OrphanNode(r.to_string())),
            );
        }
        None if graph.nodes.is_empty() => {
            errors.push(ValidationError::MissingEntry("graph has no nodes".to_string()));
        }
        None if graph.nodes.len() == 1 => entry = Some(graph.nodes[0].id.clone()),
        None => {
            let (isolated, connected): (Vec<&str>, Vec<&str>) = roots
                .iter()
                .copied()
                .partition(|r| !has_outgoing.contains(r));
            errors.extend(
                isolated
                    .iter()
                    .map(|r| ValidationError::OrphanNode(r.to_string())),
            );
            match connected.as_slice() {
                [only] => entry = Some(only.to_string()),
                [] => {}
                many => {
                    let mut many = many.iter().map(|s| s.to_string()).collect::<Vec<_>>();
                    many.sort();
                    errors.push(ValidationError::MultipleEntryPoints(many));
                }
            }
        }
    }

    // Cycles among dependency edges
    let node_ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    let edges: Vec<(&str, &str)> = valid
        .iter()
        .filter(|&&i| !loop_back.contains(&i))
        .map(|&i| (graph.edges[i].source.as_str(), graph.edges[i].target.as_str()))
        .collect();
    let order = scheduler::topological_order(&node_ids, &edges);
    if !order.blocked.is_empty() {
        errors.push(ValidationError::Cycle(cycle_members(&order.blocked, &edges)));
    } else {
        errors.extend(level_errors(&graph.nodes, &edges, &owner, &loops));
    }

    match (errors.is_empty(), entry) {
        (true, Some(entry)) => Ok(ValidatedGraph {
            graph: Arc::new(graph.clone()),
            index,
            entry,
            loop_back,
            loops,
            owner,
            executors,
        }),
        (true, None) => Err(vec![ValidationError::MissingEntry(
            "no node without incoming edges".to_string(),
        )]),
        (false, _) => Err(errors),
    }
}

/// Check that every level orders on its own once edges into nested bodies are
/// lifted to their loop. A body node that also depends on something downstream
/// of its loop (the exit path, typically) makes the loop wait on itself.
fn level_errors(
    nodes: &[Node],
    edges: &[(&str, &str)],
    owner: &HashMap<String, String>,
    loops: &HashMap<String, LoopBody>,
) -> Vec<ValidationError> {
    let mut levels: Vec<Option<&str>> = loops.keys().map(|id| Some(id.as_str())).collect();
    levels.sort();
    levels.insert(0, None);

    let mut errors = Vec::new();
    for level in levels {
        let members: Vec<&str> = nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| owner.get(*id).map(String::as_str) == level)
            .collect();
        let lifted = scheduler::level_edges(owner, edges.iter().copied(), level);
        let order = scheduler::topological_order(&members, &lifted);
        if order.blocked.is_empty() {
            continue;
        }
        let cycle = cycle_members(&order.blocked, &lifted);
        let stuck: Vec<&String> = cycle.iter().filter(|id| loops.contains_key(id.as_str())).collect();
        if stuck.is_empty() {
            errors.push(ValidationError::Cycle(cycle));
            continue;
        }
        for loop_id in stuck {
            let after: Vec<String> = cycle
                .iter()
                .filter(|id| *id != loop_id)
                .map(|id| format!("'{}'", id))
                .collect();
            errors.push(ValidationError::LoopStructure {
                node: loop_id.clone(),
                reason: format!("body depends on {}, which runs after the loop", after.join(", ")),
            });
        }
    }
    errors
}

/// Map each body node to the smallest loop body that contains it.
fn innermost_owners(loops: &HashMap<String, LoopBody>) -> HashMap<String, String> {
    let mut owner: HashMap<String, (usize, &str)> = HashMap::new();
    for (loop_id, body) in loops {
        for member in &body.members {
            let candidate = (body.members.len(), loop_id.as_str());
            owner
                .entry(member.clone())
                .and_modify(|current| {
                    if candidate < *current {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }
    }
    owner
        .into_iter()
        .map(|(node, (_, loop_id))| (node, loop_id.to_string()))
        .collect()
}

/// Narrow the nodes Kahn's algorithm could not visit down to those on a cycle,
/// dropping nodes that are merely downstream of one.
fn cycle_members(blocked: &[String], edges: &[(&str, &str)]) -> Vec<String> {
    let mut remaining: BTreeSet<&str> = blocked.iter().map(String::as_str).collect();
    loop {
        let sinks: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|n| {
                !edges
                    .iter()
                    .any(|(s, t)| s == n && remaining.contains(t))
            })
            .collect();
        if sinks.is_empty() {
            break;
        }
        for s in sinks {
            remaining.remove(s);
        }
    }
    remaining.into_iter().map(str::to_string).collect()
}
