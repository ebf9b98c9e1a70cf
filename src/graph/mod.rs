//! Generic dependency DAG (spec §4.A): topological ordering, leaf queries, and
//! minimal-cycle detection for error reporting.
//!
//! Grounded on the teacher's `StateGraph` (`petgraph::graph::DiGraph` wrapped
//! with a `HashMap<String, NodeIndex>` name index) and the pants-build
//! `engine/graph` entry arena (stable-key lookups over a petgraph graph). The
//! minimal-cycle reconstruction is the Floyd-Warshall `next`-pointer variant
//! spelled out in spec §4.A; no crate implements that narrow an algorithm, so
//! it is hand-written here, invoked only on the error path.

use std::collections::HashMap;
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use thiserror::Error;

/// Errors raised while ordering or mutating a [`DependencyGraph`].
#[derive(Error, Debug)]
pub enum GraphError {
    /// A node key was not present in the graph.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The graph could not be topologically sorted because it contains a
    /// cycle. Carries the minimal cycles found.
    #[error("circular dependencies detected")]
    CycleDetected(Vec<Cycle>),
}

/// A single minimal cycle, as a sequence of keys that returns to its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Keys along the cycle, in traversal order, with the first key repeated
    /// at the end (`a <- b <- c <- a`).
    pub keys: Vec<String>,
}

impl Cycle {
    /// Render as `a <- b <- c <- a`, matching spec §4.A's printable form.
    pub fn describe(&self) -> String {
        self.keys.join(" <- ")
    }

    fn vertex_set(&self) -> Vec<&str> {
        let mut set: Vec<&str> = self.keys[..self.keys.len().saturating_sub(1)]
            .iter()
            .map(String::as_str)
            .collect();
        set.sort_unstable();
        set.dedup();
        set
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// A generic DAG over string keys, carrying an arbitrary value per node.
///
/// Node identity is the key; re-adding a key is a no-op on the node, though
/// dependency edges are always additive.
#[derive(Clone)]
pub struct DependencyGraph<V> {
    graph: DiGraph<V, ()>,
    index: HashMap<String, NodeIndex>,
    keys: HashMap<NodeIndex, String>,
}

impl<V> Default for DependencyGraph<V> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            keys: HashMap::new(),
        }
    }
}

impl<V> DependencyGraph<V> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `key`, or replace its value if already present.
    pub fn add_node(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(&idx) = self.index.get(&key) {
            self.graph[idx] = value;
            return;
        }
        let idx = self.graph.add_node(value);
        self.keys.insert(idx, key.clone());
        self.index.insert(key, idx);
    }

    /// Record that `from` depends on `to` (an edge `from -> to`). Both nodes
    /// must already have been added.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let from_idx = *self
            .index
            .get(from)
            .ok_or_else(|| GraphError::NodeNotFound(from.to_string()))?;
        let to_idx = *self
            .index
            .get(to)
            .ok_or_else(|| GraphError::NodeNotFound(to.to_string()))?;
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    /// Number of nodes in the graph.
    pub fn size(&self) -> usize {
        self.graph.node_count()
    }

    /// All node keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Value for a given key, if present.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Topological order of all node keys (dependency-first: a node appears
    /// only after every node it depends on). When `leaves_only` is true,
    /// returns only nodes with no outgoing edges (no unresolved dependencies).
    pub fn overall_order(&self, leaves_only: bool) -> Result<Vec<String>, GraphError> {
        let sorted = petgraph::algo::toposort(&self.graph, None).map_err(|_| {
            GraphError::CycleDetected(self.find_cycles())
        })?;

        // `toposort` yields "no incoming edges first"; our edges point from a
        // node to its dependencies, so dependency-first order is the reverse.
        let mut order: Vec<NodeIndex> = sorted.into_iter().rev().collect();

        if leaves_only {
            order.retain(|&idx| {
                self.graph.edges_directed(idx, Direction::Outgoing).next().is_none()
            });
        }

        Ok(order
            .into_iter()
            .map(|idx| self.keys[&idx].clone())
            .collect())
    }

    /// Compute minimal cycles via the Floyd-Warshall `next`-pointer variant of
    /// spec §4.A. O(V^3); only ever invoked once `overall_order` fails.
    fn find_cycles(&self) -> Vec<Cycle> {
        let n = self.graph.node_count();
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        let pos: HashMap<NodeIndex, usize> =
            indices.iter().enumerate().map(|(i, &idx)| (idx, i)).collect();

        const INF: i64 = i64::MAX / 2;
        let mut dist = vec![vec![INF; n]; n];
        let mut next = vec![vec![None::<usize>; n]; n];

        for edge in self.graph.edge_references() {
            let u = pos[&edge.source()];
            let v = pos[&edge.target()];
            dist[u][v] = 1;
            next[u][v] = Some(v);
        }

        for k in 0..n {
            for i in 0..n {
                if dist[i][k] >= INF {
                    continue;
                }
                for j in 0..n {
                    if dist[k][j] >= INF {
                        continue;
                    }
                    let via = dist[i][k] + dist[k][j];
                    if via < dist[i][j] {
                        dist[i][j] = via;
                        next[i][j] = next[i][k];
                    }
                }
            }
        }

        let mut seen_vertex_sets: Vec<Vec<&str>> = Vec::new();
        let mut cycles = Vec::new();

        for v in 0..n {
            let Some(mut cur) = next[v][v] else { continue };
            let mut keys = vec![self.keys[&indices[v]].clone()];
            let mut guard = 0;
            loop {
                keys.push(self.keys[&indices[cur]].clone());
                if cur == v || guard > n {
                    break;
                }
                guard += 1;
                let Some(nxt) = next[cur][v] else { break };
                cur = nxt;
            }

            let cycle = Cycle { keys };
            let vset = cycle.vertex_set();
            if seen_vertex_sets.iter().any(|s| s == &vset) {
                continue;
            }
            seen_vertex_sets.push(vset);
            cycles.push(cycle);
        }

        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> DependencyGraph<()> {
        let mut g = DependencyGraph::new();
        g.add_node("a", ());
        g.add_node("b", ());
        g.add_node("c", ());
        g.add_dependency("c", "b").unwrap();
        g.add_dependency("b", "a").unwrap();
        g
    }

    #[test]
    fn topo_order_is_dependency_first() {
        let g = linear_graph();
        let order = g.overall_order(false).unwrap();
        let pos = |k: &str| order.iter().position(|x| x == k).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn leaves_only_returns_nodes_with_no_outgoing_edges() {
        let g = linear_graph();
        let leaves = g.overall_order(true).unwrap();
        assert_eq!(leaves, vec!["a".to_string()]);
    }

    #[test]
    fn size_and_keys() {
        let g = linear_graph();
        assert_eq!(g.size(), 3);
        let mut keys: Vec<_> = g.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn detects_a_simple_cycle() {
        let mut g = DependencyGraph::new();
        g.add_node("a", ());
        g.add_node("b", ());
        g.add_dependency("a", "b").unwrap();
        g.add_dependency("b", "a").unwrap();

        let err = g.overall_order(false).unwrap_err();
        match err {
            GraphError::CycleDetected(cycles) => {
                assert_eq!(cycles.len(), 1);
                let vset = cycles[0].vertex_set();
                assert_eq!(vset, vec!["a", "b"]);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn folds_duplicate_cycles_with_the_same_vertex_set() {
        let mut g = DependencyGraph::new();
        g.add_node("a", ());
        g.add_node("b", ());
        g.add_node("c", ());
        g.add_dependency("a", "b").unwrap();
        g.add_dependency("b", "c").unwrap();
        g.add_dependency("c", "a").unwrap();

        let err = g.overall_order(false).unwrap_err();
        match err {
            GraphError::CycleDetected(cycles) => {
                assert_eq!(cycles.len(), 1);
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_key_is_an_error() {
        let mut g: DependencyGraph<()> = DependencyGraph::new();
        g.add_node("a", ());
        assert!(matches!(
            g.add_dependency("a", "missing"),
            Err(GraphError::NodeNotFound(_))
        ));
    }
}
