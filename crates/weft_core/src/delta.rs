//! Detecting what changed between two topology snapshots.

use crate::{
    graph::{Edge, Node, Topology},
    node,
};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// A node whose code differs between two snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Update {
    pub prev: Node,
    pub next: Node,
}

/// The difference between two [`Topology`] snapshots.
///
/// Computing a delta is pure: the same pair of snapshots always produces the
/// same delta.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Delta {
    pub nodes_added: Vec<Node>,
    pub nodes_removed: Vec<Node>,
    pub nodes_updated: Vec<Update>,
    pub edges_added: Vec<Edge>,
    pub edges_removed: Vec<Edge>,
    /// Every node directly touched by the change, in the order: added,
    /// updated, removed, then both endpoints of each added and removed edge.
    pub affected: IndexSet<node::Id>,
}

impl Delta {
    /// Compare `prev` against `next`.
    pub fn compute(prev: &Topology, next: &Topology) -> Self {
        let prev_nodes = nodes_by_id(prev);
        let next_nodes = nodes_by_id(next);
        let prev_edges: IndexSet<&Edge> = prev.edges.iter().collect();
        let next_edges: IndexSet<&Edge> = next.edges.iter().collect();

        let mut delta = Delta::default();
        for (id, &node) in &next_nodes {
            match prev_nodes.get(id) {
                None => delta.nodes_added.push(node.clone()),
                Some(&prev) if prev.code != node.code => delta.nodes_updated.push(Update {
                    prev: prev.clone(),
                    next: node.clone(),
                }),
                Some(_) => (),
            }
        }
        delta.nodes_removed = prev_nodes
            .iter()
            .filter(|(id, _)| !next_nodes.contains_key(*id))
            .map(|(_, &node)| node.clone())
            .collect();
        delta.edges_added = next_edges
            .difference(&prev_edges)
            .map(|&e| e.clone())
            .collect();
        delta.edges_removed = prev_edges
            .difference(&next_edges)
            .map(|&e| e.clone())
            .collect();

        let affected = delta
            .nodes_added
            .iter()
            .map(|n| &n.id)
            .chain(delta.nodes_updated.iter().map(|u| &u.next.id))
            .chain(delta.nodes_removed.iter().map(|n| &n.id))
            .chain(
                delta
                    .edges_added
                    .iter()
                    .chain(&delta.edges_removed)
                    .flat_map(|e| [&e.source, &e.target]),
            )
            .cloned()
            .collect();
        delta.affected = affected;
        delta
    }

    /// Whether anything changed at all.
    pub fn has_changes(&self) -> bool {
        !self.nodes_added.is_empty()
            || !self.nodes_removed.is_empty()
            || !self.nodes_updated.is_empty()
            || !self.edges_added.is_empty()
            || !self.edges_removed.is_empty()
    }
}

// If an ID appears twice the later node wins, keeping the first position.
fn nodes_by_id(topology: &Topology) -> IndexMap<&str, &Node> {
    topology
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n))
        .collect()
}

#[test]
fn test_delta_of_identical_snapshots_is_empty() {
    let t = Topology::new()
        .node("a", "out y = 1")
        .node("b", "")
        .edge("a", "b")
        .edge("a", "b");
    let delta = Delta::compute(&t, &t.clone());
    assert!(!delta.has_changes());
    assert!(delta.affected.is_empty());
}

#[test]
fn test_delta_affected_order() {
    let prev = Topology::new()
        .node("a", "1")
        .node("b", "2")
        .node("gone", "3")
        .edge("a", "b")
        .edge("b", "gone");
    let next = Topology::new()
        .node("a", "1")
        .node("b", "22")
        .node("new", "4")
        .edge("a", "b")
        .edge("a", "new");
    let delta = Delta::compute(&prev, &next);
    assert!(delta.has_changes());
    assert_eq!(delta.nodes_added, [Node::new("new", "4")]);
    assert_eq!(delta.nodes_removed, [Node::new("gone", "3")]);
    assert_eq!(delta.nodes_updated.len(), 1);
    assert_eq!(delta.nodes_updated[0].prev.code, "2");
    assert_eq!(delta.edges_added, [Edge::new("a", "new")]);
    assert_eq!(delta.edges_removed, [Edge::new("b", "gone")]);
    let affected: Vec<_> = delta.affected.iter().map(String::as_str).collect();
    assert_eq!(affected, ["new", "b", "gone", "a"]);
}
