//! The canvas topology as provided by the host, and the adjacency index
//! derived from it.

use crate::node;
use indexmap::{IndexMap, IndexSet};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

/// Describes a connection from one node's outputs to another node's inputs.
///
/// Edge identity is the ordered `(source, target)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Edge {
    pub source: node::Id,
    pub target: node::Id,
}

/// A node as the host describes it: an ID and its current code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Node {
    pub id: node::Id,
    pub code: String,
}

/// A point-in-time description of the whole canvas.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Neighbours per node, each listed at most once, in insertion order.
pub type Adjacency = IndexMap<node::Id, IndexSet<node::Id>>;

/// The adjacency maps derived from a set of edges.
///
/// Never patched in place. A new index is built from scratch on every sync.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    /// The sources feeding each target.
    pub incoming: Adjacency,
    /// The targets fed by each source.
    pub outgoing: Adjacency,
}

impl Edge {
    /// Create an edge from `source` to `target`.
    pub fn new(source: impl Into<node::Id>, target: impl Into<node::Id>) -> Self {
        Edge {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl<A, B> From<(A, B)> for Edge
where
    A: Into<node::Id>,
    B: Into<node::Id>,
{
    fn from((a, b): (A, B)) -> Self {
        Edge::new(a, b)
    }
}

impl Node {
    pub fn new(id: impl Into<node::Id>, code: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            code: code.into(),
        }
    }
}

impl Topology {
    /// An empty canvas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style addition of a node.
    pub fn node(mut self, id: impl Into<node::Id>, code: impl Into<String>) -> Self {
        self.nodes.push(Node::new(id, code));
        self
    }

    /// Builder-style addition of an edge.
    pub fn edge(mut self, source: impl Into<node::Id>, target: impl Into<node::Id>) -> Self {
        self.edges.push(Edge::new(source, target));
        self
    }

    /// Look up a node by ID.
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Replace the code of the node with the given ID.
    ///
    /// Returns `false` if no such node exists.
    pub fn set_code(&mut self, id: &str, code: impl Into<String>) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.code = code.into();
                true
            }
            None => false,
        }
    }

    /// Remove every edge from `source` to `target`.
    pub fn remove_edge(&mut self, source: &str, target: &str) {
        self.edges.retain(|e| !(e.source == source && e.target == target));
    }
}

impl Index {
    /// The sources feeding the given node, in adjacency order.
    pub fn sources<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a node::Id> + use<'a> {
        self.incoming.get(id).into_iter().flatten()
    }

    /// The targets fed by the given node, in adjacency order.
    pub fn targets<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a node::Id> + use<'a> {
        self.outgoing.get(id).into_iter().flatten()
    }

    /// Targets whose set of sources differs between `self` and `next`.
    ///
    /// The order is that of `next` followed by any targets only in `self`.
    pub fn rewired_targets(&self, next: &Index) -> IndexSet<node::Id> {
        let empty = IndexSet::new();
        next.incoming
            .keys()
            .chain(self.incoming.keys())
            .filter(|id| {
                let before = self.incoming.get(id.as_str()).unwrap_or(&empty);
                let after = next.incoming.get(id.as_str()).unwrap_or(&empty);
                // Compare as sets, ignoring insertion order.
                before.len() != after.len() || !before.iter().all(|s| after.contains(s))
            })
            .cloned()
            .collect()
    }

    /// All nodes that lie on a cycle, including nodes with a self-loop.
    ///
    /// Cycles are legal. Evaluation terminates regardless, but the host may
    /// want to point them out.
    pub fn cyclic_nodes(&self) -> IndexSet<node::Id> {
        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (source, targets) in &self.outgoing {
            for target in targets {
                g.add_edge(source.as_str(), target.as_str(), ());
            }
        }
        let mut cyclic = IndexSet::new();
        for scc in petgraph::algo::tarjan_scc(&g) {
            if scc.len() > 1 || scc.iter().any(|&n| g.contains_edge(n, n)) {
                cyclic.extend(scc.into_iter().map(str::to_string));
            }
        }
        cyclic
    }
}

/// Derive the incoming and outgoing adjacency maps from the given edges.
///
/// Duplicate edges collapse to a single adjacency entry.
pub fn build_maps<'a>(edges: impl IntoIterator<Item = &'a Edge>) -> Index {
    let mut index = Index::default();
    for Edge { source, target } in edges {
        index
            .incoming
            .entry(target.clone())
            .or_default()
            .insert(source.clone());
        index
            .outgoing
            .entry(source.clone())
            .or_default()
            .insert(target.clone());
    }
    index
}

#[test]
fn test_build_maps_collapses_duplicates() {
    let edges = [
        Edge::new("a", "c"),
        Edge::new("b", "c"),
        Edge::new("a", "c"),
        Edge::new("c", "c"),
    ];
    let index = build_maps(&edges);
    let sources: Vec<_> = index.sources("c").cloned().collect();
    assert_eq!(sources, ["a", "b", "c"]);
    let targets: Vec<_> = index.targets("a").cloned().collect();
    assert_eq!(targets, ["c"]);
    assert_eq!(index.targets("missing").count(), 0);
}

#[test]
fn test_cyclic_nodes() {
    let edges = [
        Edge::new("a", "b"),
        Edge::new("b", "c"),
        Edge::new("c", "b"),
        Edge::new("d", "d"),
        Edge::new("c", "e"),
    ];
    let cyclic = build_maps(&edges).cyclic_nodes();
    let mut cyclic: Vec<_> = cyclic.into_iter().collect();
    cyclic.sort();
    assert_eq!(cyclic, ["b", "c", "d"]);
}

#[test]
fn test_rewired_targets() {
    let prev = build_maps(&[Edge::new("a", "b"), Edge::new("a", "c")]);
    let next = build_maps(&[Edge::new("a", "c"), Edge::new("x", "d")]);
    let rewired: Vec<_> = prev.rewired_targets(&next).into_iter().collect();
    assert_eq!(rewired, ["d", "b"]);
}
