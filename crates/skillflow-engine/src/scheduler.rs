//! Deterministic execution order.
//!
//! Kahn's algorithm over dependency edges (loop-back edges excluded). Among
//! nodes that become ready together the lexicographically smallest id goes
//! first, so the same graph always yields the same plan. Loop bodies get their
//! own sub-plan, which the engine replays once per iteration.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::validator::ValidatedGraph;

/// Nodes whose dependencies are all satisfied, popped smallest id first.
#[derive(Debug, Default)]
pub struct ReadyQueue<'a> {
    ready: BTreeSet<&'a str>,
}

impl<'a> ReadyQueue<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: &'a str) {
        self.ready.insert(id);
    }

    pub fn pop(&mut self) -> Option<&'a str> {
        self.ready.pop_first()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

/// Outcome of Kahn's algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopoOrder {
    /// Visited nodes, in order.
    pub order: Vec<String>,
    /// Nodes never visited because they sit on or behind a cycle, sorted.
    pub blocked: Vec<String>,
}

/// Order `nodes` by `edges`. Edges touching a node outside `nodes` are ignored.
pub fn topological_order(nodes: &[&str], edges: &[(&str, &str)]) -> TopoOrder {
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|&n| (n, 0)).collect();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
    for &(source, target) in edges {
        if !in_degree.contains_key(source) || !in_degree.contains_key(target) {
            continue;
        }
        successors.entry(source).or_default().push(target);
        if let Some(d) = in_degree.get_mut(target) {
            *d += 1;
        }
    }

    let mut queue = ReadyQueue::new();
    for (&node, &degree) in &in_degree {
        if degree == 0 {
            queue.push(node);
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop() {
        order.push(node.to_string());
        for &next in successors.get(node).map(Vec::as_slice).unwrap_or_default() {
            if let Some(d) = in_degree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push(next);
                }
            }
        }
    }

    let mut blocked: Vec<String> = in_degree
        .into_iter()
        .filter(|(_, d)| *d > 0)
        .map(|(n, _)| n.to_string())
        .collect();
    blocked.sort();
    TopoOrder { order, blocked }
}

/// Execution order for a validated graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    order: Vec<String>,
    bodies: HashMap<String, Vec<String>>,
}

impl Plan {
    /// Top-level order; loop body nodes are not part of it.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Per-iteration order of a loop's own body nodes (nested bodies excluded).
    pub fn body(&self, loop_id: &str) -> &[String] {
        self.bodies.get(loop_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.order.len() + self.bodies.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the plan. Cannot fail for a graph that passed validation.
///
/// Each level (top level, or one loop's body) is ordered separately. An edge
/// into a nested body counts as an edge into the loop node that owns it at
/// that level, so data a body reads from outside is produced before its loop.
pub fn plan(graph: &ValidatedGraph) -> Plan {
    let top = level_order(graph, None);
    let mut bodies = HashMap::new();
    for loop_id in graph.loop_ids() {
        bodies.insert(loop_id.to_string(), level_order(graph, Some(loop_id)));
    }
    debug!(nodes = top.len(), loops = bodies.len(), "Plan built");
    Plan { order: top, bodies }
}

fn level_order(graph: &ValidatedGraph, level: Option<&str>) -> Vec<String> {
    let nodes: Vec<&str> = graph
        .node_ids()
        .filter(|id| graph.owner(id) == level)
        .collect();
    let edges = level_edges(
        graph.owners(),
        graph
            .dependency_edges()
            .map(|e| (e.source.as_str(), e.target.as_str())),
        level,
    );
    let TopoOrder { order, blocked } = topological_order(&nodes, &edges);
    if !blocked.is_empty() {
        warn!(level = level.unwrap_or("<top>"), blocked = ?blocked, "Nodes left out of plan");
    }
    order
}

/// Dependency edges as seen from one level (the top level, or one loop's
/// body). Endpoints inside a nested body are replaced by the loop that owns
/// them at `level`; edges that collapse onto a single node are dropped.
pub(crate) fn level_edges<'g>(
    owners: &'g HashMap<String, String>,
    edges: impl Iterator<Item = (&'g str, &'g str)>,
    level: Option<&str>,
) -> Vec<(&'g str, &'g str)> {
    edges
        .filter_map(|(source, target)| {
            let source = representative(owners, source, level)?;
            let target = representative(owners, target, level)?;
            (source != target).then_some((source, target))
        })
        .collect()
}

/// The node standing for `id` at `level`: `id` itself, or the loop at that
/// level whose body (transitively) contains it.
fn representative<'g>(
    owners: &'g HashMap<String, String>,
    id: &'g str,
    level: Option<&str>,
) -> Option<&'g str> {
    let mut current = id;
    loop {
        let owner = owners.get(current).map(String::as_str);
        if owner == level {
            return Some(current);
        }
        current = owner?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Graph, Node};
    use crate::validator::validate;
    use serde_json::json;

    fn tool(id: &str) -> Node {
        Node::tool(id, "echo", json!({}))
    }

    #[test]
    fn ready_queue_pops_smallest_first() {
        let mut q = ReadyQueue::new();
        q.push("c");
        q.push("a");
        q.push("b");
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop(), Some("b"));
        assert_eq!(q.pop(), Some("c"));
        assert!(q.is_empty());
    }

    #[test]
    fn diamond_breaks_ties_lexicographically() {
        let order = topological_order(
            &["start", "zeta", "alpha", "end"],
            &[
                ("start", "zeta"),
                ("start", "alpha"),
                ("zeta", "end"),
                ("alpha", "end"),
            ],
        );
        assert_eq!(order.order, vec!["start", "alpha", "zeta", "end"]);
        assert!(order.blocked.is_empty());
    }

    #[test]
    fn cycle_leaves_blocked_nodes() {
        let order = topological_order(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        assert_eq!(order.order, vec!["a"]);
        assert_eq!(order.blocked, vec!["b", "c"]);
    }

    #[test]
    fn foreign_edges_ignored() {
        let order = topological_order(&["a", "b"], &[("x", "a"), ("a", "b")]);
        assert_eq!(order.order, vec!["a", "b"]);
    }

    #[test]
    fn plan_is_deterministic_across_edge_orderings() {
        let build = |reverse: bool| {
            let mut edges = vec![
                Edge::new("root", "m"),
                Edge::new("root", "b"),
                Edge::new("root", "x"),
                Edge::new("b", "end"),
                Edge::new("m", "end"),
                Edge::new("x", "end"),
            ];
            if reverse {
                edges.reverse();
            }
            let mut graph = Graph::new("g");
            for id in ["x", "end", "m", "root", "b"] {
                graph = graph.with_node(tool(id));
            }
            graph.edges = edges;
            plan(&validate(&graph).unwrap())
        };
        let first = build(false);
        assert_eq!(first.order(), ["root", "b", "m", "x", "end"]);
        for _ in 0..5 {
            assert_eq!(build(true), first);
            assert_eq!(build(false), first);
        }
    }

    #[test]
    fn loop_bodies_get_sub_plans() {
        let graph = Graph::new("g")
            .with_node(tool("src"))
            .with_node(Node::loop_over("l", "${src}"))
            .with_node(tool("fetch"))
            .with_node(tool("parse"))
            .with_node(tool("audit"))
            .with_node(tool("done"))
            .with_edge(Edge::new("src", "l"))
            .with_edge(Edge::labeled("l", "fetch", "body"))
            .with_edge(Edge::new("fetch", "parse"))
            .with_edge(Edge::new("fetch", "audit"))
            .with_edge(Edge::new("parse", "l"))
            .with_edge(Edge::labeled("l", "done", "exit"));
        let plan = plan(&validate(&graph).unwrap());
        assert_eq!(plan.order(), ["src", "l", "done"]);
        assert_eq!(plan.body("l"), ["fetch", "audit", "parse"]);
        assert!(plan.body("src").is_empty());
        assert_eq!(plan.len(), 6);
    }

    #[test]
    fn outside_producer_runs_before_loop() {
        // "zz_config" feeds a body node; it must run before the loop even
        // though "loop" sorts first.
        let graph = Graph::new("g")
            .with_node(tool("a"))
            .with_node(Node::loop_over("loop", "${a}"))
            .with_node(tool("zz_config"))
            .with_node(tool("work"))
            .with_edge(Edge::new("a", "loop"))
            .with_edge(Edge::new("a", "zz_config"))
            .with_edge(Edge::labeled("loop", "work", "body"))
            .with_edge(Edge::new("zz_config", "work"));
        let plan = plan(&validate(&graph).unwrap());
        assert_eq!(plan.order(), ["a", "zz_config", "loop"]);
        assert_eq!(plan.body("loop"), ["work"]);
    }

    #[test]
    fn nested_loop_levels() {
        let graph = Graph::new("g")
            .with_node(Node::loop_over("outer", "${input}"))
            .with_node(Node::loop_over("inner", "${loop_var}"))
            .with_node(tool("cell"))
            .with_node(tool("row_done"))
            .with_edge(Edge::labeled("outer", "inner", "body"))
            .with_edge(Edge::labeled("inner", "cell", "body"))
            .with_edge(Edge::labeled("inner", "row_done", "exit"));
        let plan = plan(&validate(&graph).unwrap());
        assert_eq!(plan.order(), ["outer"]);
        assert_eq!(plan.body("outer"), ["inner", "row_done"]);
        assert_eq!(plan.body("inner"), ["cell"]);
    }
}
