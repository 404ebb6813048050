//! Centrality metrics for entity networks
//!
//! PageRank, betweenness, weighted degree, and eigenvector centrality,
//! all over the weighted undirected graph with the shared edge-weight
//! policy. Every metric lands in [0, 1] after normalization.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{EntityGraph, NodeIndex};
use crate::types::{GraphEdge, GraphNode};

/// All four metrics for one node
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CentralityScores {
    pub pagerank: f64,
    pub betweenness: f64,
    pub degree: f64,
    pub eigenvector: f64,
}

// =============================================================================
// CentralityCalculator
// =============================================================================

pub struct CentralityCalculator {
    damping: f64,
    max_iter: usize,
}

impl Default for CentralityCalculator {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iter: 100,
        }
    }
}

impl CentralityCalculator {
    pub fn new(damping: f64, max_iter: usize) -> Self {
        Self { damping, max_iter }
    }

    /// Weight-aware PageRank
    ///
    /// A graph without edges yields the uniform distribution `1/|V|`.
    pub fn pagerank(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> HashMap<String, f64> {
        if nodes.is_empty() {
            return HashMap::new();
        }
        if edges.is_empty() {
            let uniform = 1.0 / nodes.len() as f64;
            return nodes.iter().map(|n| (n.id.clone(), uniform)).collect();
        }

        let graph = EntityGraph::from_parts(nodes, edges);
        let n = graph.node_count();
        let uniform = 1.0 / n as f64;

        let degrees: Vec<f64> = graph
            .node_indices()
            .map(|idx| graph.weighted_degree(idx))
            .collect();

        let mut ranks = vec![uniform; n];

        for _ in 0..self.max_iter {
            let mut next = vec![(1.0 - self.damping) / n as f64; n];

            // Weight-proportional mass transfer; dangling mass spreads
            // uniformly
            let mut dangling = 0.0;
            for idx in graph.node_indices() {
                let i = idx.index();
                if degrees[i] <= 0.0 {
                    dangling += ranks[i];
                    continue;
                }
                for (neighbor, weight) in graph.neighbors(idx) {
                    next[neighbor.index()] += self.damping * ranks[i] * weight / degrees[i];
                }
            }
            for value in next.iter_mut() {
                *value += self.damping * dangling / n as f64;
            }

            let delta: f64 = next
                .iter()
                .zip(ranks.iter())
                .map(|(a, b)| (a - b).abs())
                .sum();
            ranks = next;
            if delta < 1e-6 * n as f64 {
                break;
            }
        }

        info!(nodes = n, "computed PageRank");

        graph
            .node_indices()
            .map(|idx| (graph.id_of(idx).to_string(), ranks[idx.index()]))
            .collect()
    }

    /// Normalized betweenness centrality
    ///
    /// Shortest-path distance is `1 / (weight + 0.01)`, so heavier edges
    /// shorten paths.
    pub fn betweenness(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> HashMap<String, f64> {
        if nodes.is_empty() || edges.is_empty() {
            return nodes.iter().map(|n| (n.id.clone(), 0.0)).collect();
        }

        let graph = EntityGraph::from_parts(nodes, edges);
        let n = graph.node_count();
        let mut scores = vec![0.0; n];

        for source in graph.node_indices() {
            brandes_accumulate(&graph, source, &mut scores);
        }

        // Undirected: every pair was counted from both endpoints
        for score in scores.iter_mut() {
            *score /= 2.0;
        }
        if n > 2 {
            let scale = 2.0 / ((n - 1) as f64 * (n - 2) as f64);
            for score in scores.iter_mut() {
                *score *= scale;
            }
        } else {
            scores.iter_mut().for_each(|s| *s = 0.0);
        }

        info!(nodes = n, "computed betweenness");

        graph
            .node_indices()
            .map(|idx| (graph.id_of(idx).to_string(), scores[idx.index()]))
            .collect()
    }

    /// Weighted degree centrality, min-max normalized to [0, 1]
    pub fn degree(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> HashMap<String, f64> {
        if nodes.is_empty() {
            return HashMap::new();
        }

        let graph = EntityGraph::from_parts(nodes, edges);
        let degrees: Vec<f64> = graph
            .node_indices()
            .map(|idx| graph.weighted_degree(idx))
            .collect();

        let max = degrees.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = degrees.iter().cloned().fold(f64::INFINITY, f64::min);
        let range = max - min;

        graph
            .node_indices()
            .map(|idx| {
                let raw = degrees[idx.index()];
                let normalized = if range > 0.0 {
                    (raw - min) / range
                } else if max > 0.0 {
                    1.0
                } else {
                    0.0
                };
                (graph.id_of(idx).to_string(), normalized)
            })
            .collect()
    }

    /// Eigenvector centrality by power iteration
    ///
    /// Falls back to weighted degree when the iteration does not
    /// converge within `max_iter` rounds.
    pub fn eigenvector(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> HashMap<String, f64> {
        if nodes.is_empty() || edges.is_empty() {
            return nodes.iter().map(|n| (n.id.clone(), 0.0)).collect();
        }

        let graph = EntityGraph::from_parts(nodes, edges);
        let n = graph.node_count();

        let mut x = vec![1.0 / n as f64; n];
        let mut converged = false;

        for _ in 0..self.max_iter {
            // x' = (I + A_w) x, then L2 normalize
            let mut next = x.clone();
            for idx in graph.node_indices() {
                for (neighbor, weight) in graph.neighbors(idx) {
                    next[neighbor.index()] += x[idx.index()] * weight;
                }
            }

            let norm = next.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm <= 0.0 {
                break;
            }
            for value in next.iter_mut() {
                *value /= norm;
            }

            let delta: f64 = next
                .iter()
                .zip(x.iter())
                .map(|(a, b)| (a - b).abs())
                .sum();
            x = next;
            if delta < 1e-6 * n as f64 {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!("eigenvector centrality did not converge, falling back to weighted degree");
            return self.degree(nodes, edges);
        }

        graph
            .node_indices()
            .map(|idx| (graph.id_of(idx).to_string(), x[idx.index()]))
            .collect()
    }

    /// All four metrics per node
    pub fn calculate_all(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
    ) -> HashMap<String, CentralityScores> {
        let pagerank = self.pagerank(nodes, edges);
        let betweenness = self.betweenness(nodes, edges);
        let degree = self.degree(nodes, edges);
        let eigenvector = self.eigenvector(nodes, edges);

        nodes
            .iter()
            .map(|node| {
                let id = node.id.clone();
                let scores = CentralityScores {
                    pagerank: pagerank.get(&id).copied().unwrap_or(0.0),
                    betweenness: betweenness.get(&id).copied().unwrap_or(0.0),
                    degree: degree.get(&id).copied().unwrap_or(0.0),
                    eigenvector: eigenvector.get(&id).copied().unwrap_or(0.0),
                };
                (id, scores)
            })
            .collect()
    }

    /// Top-k nodes by score, descending, ties broken by node id
    pub fn rank_nodes(scores: &HashMap<String, f64>, top_k: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> =
            scores.iter().map(|(id, &s)| (id.clone(), s)).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_k);
        ranked
    }

    /// Min-max normalize scores into [min_val, max_val]; equal scores
    /// collapse to the midpoint
    pub fn normalize_scores(
        scores: &HashMap<String, f64>,
        min_val: f64,
        max_val: f64,
    ) -> HashMap<String, f64> {
        if scores.is_empty() {
            return HashMap::new();
        }

        let current_min = scores.values().cloned().fold(f64::INFINITY, f64::min);
        let current_max = scores.values().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = current_max - current_min;

        scores
            .iter()
            .map(|(id, &score)| {
                let normalized = if range > 0.0 {
                    min_val + (score - current_min) / range * (max_val - min_val)
                } else {
                    (min_val + max_val) / 2.0
                };
                (id.clone(), normalized)
            })
            .collect()
    }
}

// =============================================================================
// Brandes accumulation
// =============================================================================

/// Heap entry for Dijkstra, ordered by distance then node index
struct HeapEntry {
    distance: f64,
    node: NodeIndex,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.node == other.node
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on distance
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.node.index().cmp(&self.node.index()))
    }
}

/// One source of Brandes' algorithm with Dijkstra shortest paths
fn brandes_accumulate(graph: &EntityGraph, source: NodeIndex, scores: &mut [f64]) {
    let n = graph.node_count();

    let mut distance = vec![f64::INFINITY; n];
    let mut sigma = vec![0.0; n];
    let mut predecessors: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
    let mut visited_order: Vec<NodeIndex> = Vec::new();
    let mut settled = vec![false; n];

    distance[source.index()] = 0.0;
    sigma[source.index()] = 1.0;

    let mut heap = BinaryHeap::new();
    heap.push(HeapEntry {
        distance: 0.0,
        node: source,
    });

    while let Some(HeapEntry { distance: d, node }) = heap.pop() {
        if settled[node.index()] {
            continue;
        }
        settled[node.index()] = true;
        visited_order.push(node);

        for (neighbor, weight) in graph.neighbors(node) {
            let step = 1.0 / (weight + 0.01);
            let candidate = d + step;
            let i = neighbor.index();

            if candidate < distance[i] {
                distance[i] = candidate;
                sigma[i] = sigma[node.index()];
                predecessors[i] = vec![node];
                heap.push(HeapEntry {
                    distance: candidate,
                    node: neighbor,
                });
            } else if candidate == distance[i] {
                sigma[i] += sigma[node.index()];
                predecessors[i].push(node);
            }
        }
    }

    // Dependency accumulation in reverse settlement order
    let mut delta = vec![0.0; n];
    for &node in visited_order.iter().rev() {
        for &pred in &predecessors[node.index()] {
            delta[pred.index()] +=
                sigma[pred.index()] / sigma[node.index()] * (1.0 + delta[node.index()]);
        }
        if node != source {
            scores[node.index()] += delta[node.index()];
        }
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

    fn edge(source: &str, target: &str, strength: f64) -> GraphEdge {
        GraphEdge::new(source, target).with_strength(strength)
    }

    /// Path graph a - b - c: b sits on every shortest path
    fn path_graph() -> (Vec<GraphNode>, Vec<GraphEdge>) {
        (
            vec![node("a"), node("b"), node("c")],
            vec![edge("a", "b", 1.0), edge("b", "c", 1.0)],
        )
    }

    /// Star with hub h connected to four leaves
    fn star_graph() -> (Vec<GraphNode>, Vec<GraphEdge>) {
        let nodes = vec![node("h"), node("l1"), node("l2"), node("l3"), node("l4")];
        let edges = ["l1", "l2", "l3", "l4"]
            .iter()
            .map(|&leaf| edge("h", leaf, 1.0))
            .collect();
        (nodes, edges)
    }

    // -------------------------------------------------------------------------
    // PageRank
    // -------------------------------------------------------------------------

    #[test]
    fn test_pagerank_sums_to_one() {
        let (nodes, edges) = star_graph();
        let ranks = CentralityCalculator::default().pagerank(&nodes, &edges);

        let total: f64 = ranks.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(ranks.values().all(|&r| (0.0..=1.0).contains(&r)));
    }

    #[test]
    fn test_pagerank_hub_wins() {
        let (nodes, edges) = star_graph();
        let ranks = CentralityCalculator::default().pagerank(&nodes, &edges);

        assert!(ranks["h"] > ranks["l1"], "hub must outrank leaves");
    }

    #[test]
    fn test_pagerank_no_edges_uniform() {
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let ranks = CentralityCalculator::default().pagerank(&nodes, &[]);

        for rank in ranks.values() {
            assert!((rank - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_pagerank_weight_aware() {
        // b is tied strongly to a, weakly to c
        let nodes = vec![node("a"), node("b"), node("c")];
        let edges = vec![edge("a", "b", 10.0), edge("b", "c", 0.1)];

        let ranks = CentralityCalculator::default().pagerank(&nodes, &edges);
        assert!(ranks["a"] > ranks["c"], "heavier edge should attract more mass");
    }

    // -------------------------------------------------------------------------
    // Betweenness
    // -------------------------------------------------------------------------

    #[test]
    fn test_betweenness_bridge_node() {
        let (nodes, edges) = path_graph();
        let scores = CentralityCalculator::default().betweenness(&nodes, &edges);

        assert!((scores["b"] - 1.0).abs() < 1e-9, "b carries the only a-c path");
        assert_eq!(scores["a"], 0.0);
        assert_eq!(scores["c"], 0.0);
    }

    #[test]
    fn test_betweenness_range() {
        let (nodes, edges) = star_graph();
        let scores = CentralityCalculator::default().betweenness(&nodes, &edges);

        assert!(scores.values().all(|&s| (0.0..=1.0 + 1e-9).contains(&s)));
        assert!((scores["h"] - 1.0).abs() < 1e-9, "hub lies on every leaf pair path");
    }

    #[test]
    fn test_betweenness_empty_edges() {
        let nodes = vec![node("a"), node("b")];
        let scores = CentralityCalculator::default().betweenness(&nodes, &[]);

        assert!(scores.values().all(|&s| s == 0.0));
    }

    #[test]
    fn test_betweenness_prefers_heavy_route() {
        // Two routes a -> d: via b (heavy edges) and via c (light edges).
        // Heavy edges mean short distances, so b carries the traffic.
        let nodes = vec![node("a"), node("b"), node("c"), node("d")];
        let edges = vec![
            edge("a", "b", 5.0),
            edge("b", "d", 5.0),
            edge("a", "c", 0.5),
            edge("c", "d", 0.5),
        ];

        let scores = CentralityCalculator::default().betweenness(&nodes, &edges);
        assert!(scores["b"] > scores["c"]);
    }

    // -------------------------------------------------------------------------
    // Degree
    // -------------------------------------------------------------------------

    #[test]
    fn test_degree_normalized() {
        let (nodes, edges) = star_graph();
        let scores = CentralityCalculator::default().degree(&nodes, &edges);

        assert!((scores["h"] - 1.0).abs() < 1e-12, "max degree maps to 1");
        assert!((scores["l1"] - 0.0).abs() < 1e-12, "min degree maps to 0");
    }

    #[test]
    fn test_degree_all_equal() {
        let nodes = vec![node("a"), node("b")];
        let edges = vec![edge("a", "b", 2.0)];

        let scores = CentralityCalculator::default().degree(&nodes, &edges);
        assert!(scores.values().all(|&s| (s - 1.0).abs() < 1e-12));
    }

    // -------------------------------------------------------------------------
    // Eigenvector
    // -------------------------------------------------------------------------

    #[test]
    fn test_eigenvector_hub_wins() {
        let (nodes, edges) = star_graph();
        let scores = CentralityCalculator::default().eigenvector(&nodes, &edges);

        assert!(scores["h"] > scores["l1"]);
        assert!(scores.values().all(|&s| (0.0..=1.0 + 1e-9).contains(&s)));
    }

    #[test]
    fn test_eigenvector_empty_edges_zero() {
        let nodes = vec![node("a"), node("b")];
        let scores = CentralityCalculator::default().eigenvector(&nodes, &[]);

        assert!(scores.values().all(|&s| s == 0.0));
    }

    // -------------------------------------------------------------------------
    // Aggregation & helpers
    // -------------------------------------------------------------------------

    #[test]
    fn test_calculate_all() {
        let (nodes, edges) = star_graph();
        let all = CentralityCalculator::default().calculate_all(&nodes, &edges);

        assert_eq!(all.len(), nodes.len());
        let hub = &all["h"];
        assert!(hub.pagerank > 0.0);
        assert!((hub.degree - 1.0).abs() < 1e-12);
        assert!(hub.betweenness > 0.9);
        assert!(hub.eigenvector > 0.0);
    }

    #[test]
    fn test_rank_nodes_deterministic_ties() {
        let mut scores = HashMap::new();
        scores.insert("b".to_string(), 0.5);
        scores.insert("a".to_string(), 0.5);
        scores.insert("c".to_string(), 0.9);

        let ranked = CentralityCalculator::rank_nodes(&scores, 3);

        assert_eq!(ranked[0].0, "c");
        assert_eq!(ranked[1].0, "a", "ties break by node id ascending");
        assert_eq!(ranked[2].0, "b");
    }

    #[test]
    fn test_normalize_scores() {
        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 2.0);
        scores.insert("b".to_string(), 4.0);
        scores.insert("c".to_string(), 6.0);

        let normalized = CentralityCalculator::normalize_scores(&scores, 0.0, 1.0);

        assert!((normalized["a"] - 0.0).abs() < 1e-12);
        assert!((normalized["b"] - 0.5).abs() < 1e-12);
        assert!((normalized["c"] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_scores_all_equal() {
        let mut scores = HashMap::new();
        scores.insert("a".to_string(), 3.0);
        scores.insert("b".to_string(), 3.0);

        let normalized = CentralityCalculator::normalize_scores(&scores, 0.0, 1.0);
        assert!(normalized.values().all(|&s| (s - 0.5).abs() < 1e-12));
    }
}
