//! In-memory entity graph shared by community detection, centrality, and
//! layout
//!
//! Wraps an undirected petgraph (via rustworkx-core, for version
//! compatibility) with interned node keys so the repeated entity-name
//! strings of a corpus are stored once.

pub mod centrality;
pub mod community;
pub mod layout;

use std::collections::HashMap;

use lasso::{Rodeo, Spur};
use rustworkx_core::petgraph::graph::UnGraph;
use rustworkx_core::petgraph::visit::EdgeRef;

pub use rustworkx_core::petgraph::graph::NodeIndex;

use crate::types::{GraphEdge, GraphNode};

// =============================================================================
// Types
// =============================================================================

/// Node payload: interned id plus display attributes
#[derive(Debug, Clone)]
pub struct NodeData {
    pub key: Spur,
    pub label: String,
    pub kind: String,
    pub weight: f64,
}

/// Undirected weighted graph over interned entity ids
pub struct EntityGraph {
    graph: UnGraph<NodeData, f64>,
    rodeo: Rodeo,
    index: HashMap<Spur, NodeIndex>,
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityGraph {
    pub fn new() -> Self {
        Self {
            graph: UnGraph::new_undirected(),
            rodeo: Rodeo::default(),
            index: HashMap::new(),
        }
    }

    /// Build from boundary records; edge weights follow the shared
    /// strength > npmi > proximity policy
    pub fn from_parts(nodes: &[GraphNode], edges: &[GraphEdge]) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.ensure_node(node);
        }
        for edge in edges {
            graph.add_edge(&edge.source, &edge.target, edge.weight());
        }
        graph
    }

    /// Add a node or return the existing one with the same id
    pub fn ensure_node(&mut self, node: &GraphNode) -> NodeIndex {
        let key = self.rodeo.get_or_intern(&node.id);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }

        let idx = self.graph.add_node(NodeData {
            key,
            label: node.label.clone(),
            kind: node.node_type.clone(),
            weight: node.weight,
        });
        self.index.insert(key, idx);
        idx
    }

    /// Add or update the edge between two existing nodes
    ///
    /// A repeated pair replaces the previous weight, so parallel input
    /// edges collapse to the last one seen.
    pub fn add_edge(&mut self, source: &str, target: &str, weight: f64) -> bool {
        let Some(source_idx) = self.index_of(source) else {
            return false;
        };
        let Some(target_idx) = self.index_of(target) else {
            return false;
        };
        if source_idx == target_idx {
            return false;
        }

        self.graph.update_edge(source_idx, target_idx, weight);
        true
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        let key = self.rodeo.get(id)?;
        self.index.get(&key).copied()
    }

    /// Resolve a node index back to its entity id
    pub fn id_of(&self, idx: NodeIndex) -> &str {
        self.rodeo.resolve(&self.graph[idx].key)
    }

    pub fn node(&self, idx: NodeIndex) -> &NodeData {
        &self.graph[idx]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Neighbors of a node with edge weights
    pub fn neighbors(&self, idx: NodeIndex) -> Vec<(NodeIndex, f64)> {
        let mut neighbors: Vec<(NodeIndex, f64)> = self
            .graph
            .edges(idx)
            .map(|edge| {
                let other = if edge.source() == idx {
                    edge.target()
                } else {
                    edge.source()
                };
                (other, *edge.weight())
            })
            .collect();
        neighbors.sort_by_key(|(n, _)| n.index());
        neighbors
    }

    /// All edges as (source, target, weight) with source index < target index
    pub fn edges(&self) -> Vec<(NodeIndex, NodeIndex, f64)> {
        let mut edges: Vec<(NodeIndex, NodeIndex, f64)> = self
            .graph
            .edge_references()
            .map(|edge| {
                let (a, b) = (edge.source(), edge.target());
                if a.index() <= b.index() {
                    (a, b, *edge.weight())
                } else {
                    (b, a, *edge.weight())
                }
            })
            .collect();
        edges.sort_by_key(|&(a, b, _)| (a.index(), b.index()));
        edges
    }

    /// Sum of incident edge weights
    pub fn weighted_degree(&self, idx: NodeIndex) -> f64 {
        self.graph.edges(idx).map(|edge| *edge.weight()).sum()
    }

    /// Connected components as node-index groups, ordered by their
    /// smallest member
    pub fn connected_components(&self) -> Vec<Vec<NodeIndex>> {
        let mut seen = vec![false; self.graph.node_count()];
        let mut components = Vec::new();

        for start in self.graph.node_indices() {
            if seen[start.index()] {
                continue;
            }

            let mut component = Vec::new();
            let mut queue = std::collections::VecDeque::new();
            queue.push_back(start);
            seen[start.index()] = true;

            while let Some(node) = queue.pop_front() {
                component.push(node);
                for (neighbor, _) in self.neighbors(node) {
                    if !seen[neighbor.index()] {
                        seen[neighbor.index()] = true;
                        queue.push_back(neighbor);
                    }
                }
            }

            component.sort_by_key(|n| n.index());
            components.push(component);
        }

        components
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> GraphNode {
        GraphNode::new(id, id, "PERSON")
    }

    fn graph_from(edges: &[(&str, &str, f64)]) -> EntityGraph {
        let mut ids: Vec<&str> = edges.iter().flat_map(|(a, b, _)| [*a, *b]).collect();
        ids.sort_unstable();
        ids.dedup();

        let nodes: Vec<GraphNode> = ids.into_iter().map(node).collect();
        let graph_edges: Vec<GraphEdge> = edges
            .iter()
            .map(|(a, b, w)| GraphEdge::new(*a, *b).with_strength(*w))
            .collect();
        EntityGraph::from_parts(&nodes, &graph_edges)
    }

    #[test]
    fn test_ensure_node_dedups() {
        let mut graph = EntityGraph::new();
        let first = graph.ensure_node(&node("alice"));
        let second = graph.ensure_node(&node("alice"));

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_add_edge_requires_nodes() {
        let mut graph = EntityGraph::new();
        graph.ensure_node(&node("alice"));

        assert!(!graph.add_edge("alice", "bob", 1.0), "missing target");
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_edge_rejects_self_loop() {
        let mut graph = EntityGraph::new();
        graph.ensure_node(&node("alice"));

        assert!(!graph.add_edge("alice", "alice", 1.0));
    }

    #[test]
    fn test_parallel_edges_collapse() {
        let mut graph = EntityGraph::new();
        graph.ensure_node(&node("alice"));
        graph.ensure_node(&node("bob"));
        graph.add_edge("alice", "bob", 1.0);
        graph.add_edge("alice", "bob", 2.5);

        assert_eq!(graph.edge_count(), 1);
        let idx = graph.index_of("alice").unwrap();
        assert!((graph.weighted_degree(idx) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_id_roundtrip() {
        let mut graph = EntityGraph::new();
        let idx = graph.ensure_node(&node("Phil Scott"));

        assert_eq!(graph.id_of(idx), "Phil Scott");
        assert_eq!(graph.index_of("Phil Scott"), Some(idx));
    }

    #[test]
    fn test_weighted_degree() {
        let graph = graph_from(&[("a", "b", 1.0), ("a", "c", 2.0)]);
        let a = graph.index_of("a").unwrap();

        assert!((graph.weighted_degree(a) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_connected_components() {
        let graph = graph_from(&[("a", "b", 1.0), ("c", "d", 1.0)]);

        let components = graph.connected_components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].len(), 2);
    }

    #[test]
    fn test_from_parts_uses_weight_policy() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![GraphEdge {
            source: "a".to_string(),
            target: "b".to_string(),
            strength: None,
            npmi: Some(0.6),
            proximity_weight: None,
        }];

        let graph = EntityGraph::from_parts(&nodes, &edges);
        let a = graph.index_of("a").unwrap();
        assert!((graph.weighted_degree(a) - 0.6).abs() < 1e-12);
    }
}
