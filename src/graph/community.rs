//! Community detection for entity networks
//!
//! Modularity-optimizing detection in the Louvain style: seeded local
//! moving plus graph aggregation, repeated until modularity stops
//! improving. Falls back to connected components when optimization
//! cannot run; communities below the minimum size are relabeled to the
//! sentinel `-1` ("other").

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::EntityGraph;
use crate::config::CommunityConfig;
use crate::types::{GraphEdge, GraphNode};

/// Sentinel community for nodes in below-minimum-size groups
pub const OTHER_COMMUNITY: i64 = -1;

/// Gray assigned to the sentinel community
const OTHER_COLOR: &str = "#95a5a6";

/// Fixed palette cycled over community ids in ascending order
const COMMUNITY_COLORS: [&str; 20] = [
    "#e74c3c", "#3498db", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c", "#e67e22", "#34495e",
    "#16a085", "#c0392b", "#27ae60", "#2980b9", "#8e44ad", "#d35400", "#c0392b", "#7f8c8d",
    "#2c3e50", "#f1c40f", "#e74c3c", "#95a5a6",
];

const LOUVAIN_SEED: u64 = 42;

// =============================================================================
// Types
// =============================================================================

/// Per-community summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityMetadata {
    pub community_id: i64,
    pub size: usize,
    pub internal_edges: usize,
    pub external_edges: usize,
    /// internal / (internal + external), 0 when the community has no edges
    pub cohesion: f64,
    /// Mode over member node types
    pub dominant_type: String,
    pub node_ids: Vec<String>,
    /// Top 5 members by node weight
    pub top_entities: Vec<String>,
}

/// Node of the collapsed, zoomed-out view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuperNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub weight: f64,
    pub is_super_node: bool,
    pub member_ids: Vec<String>,
}

// =============================================================================
// CommunityDetector
// =============================================================================

pub struct CommunityDetector {
    resolution: f64,
    min_community_size: usize,
}

impl Default for CommunityDetector {
    fn default() -> Self {
        Self::new(1.0, 2)
    }
}

impl CommunityDetector {
    pub fn new(resolution: f64, min_community_size: usize) -> Self {
        Self {
            resolution,
            min_community_size,
        }
    }

    pub fn from_config(config: &CommunityConfig) -> Self {
        Self::new(config.resolution, config.min_community_size)
    }

    /// Partition the graph into communities
    ///
    /// Returns node id -> community id (0, 1, 2, ... with `-1` for the
    /// "other" bucket). No edges puts every node into community 0.
    pub fn detect(&self, nodes: &[GraphNode], edges: &[GraphEdge]) -> HashMap<String, i64> {
        if nodes.is_empty() {
            return HashMap::new();
        }
        if edges.is_empty() {
            return nodes.iter().map(|n| (n.id.clone(), 0)).collect();
        }

        let graph = EntityGraph::from_parts(nodes, edges);

        let communities = match louvain(&graph, self.resolution) {
            Some(communities) => communities,
            None => {
                debug!("modularity optimization unavailable, using connected components");
                graph.connected_components()
            }
        };

        let mut mapping: HashMap<String, i64> = HashMap::new();
        let mut sizes: HashMap<i64, usize> = HashMap::new();

        for (community_id, members) in communities.iter().enumerate() {
            sizes.insert(community_id as i64, members.len());
            for &idx in members {
                mapping.insert(graph.id_of(idx).to_string(), community_id as i64);
            }
        }

        // Relabel small communities to the sentinel
        if self.min_community_size > 1 {
            for community_id in mapping.values_mut() {
                if sizes.get(community_id).copied().unwrap_or(0) < self.min_community_size {
                    *community_id = OTHER_COMMUNITY;
                }
            }
        }

        info!(
            communities = sizes.len(),
            resolution = self.resolution,
            min_size = self.min_community_size,
            "detected communities"
        );

        mapping
    }

    /// Assign display colors: the sentinel gets gray, the rest walk the
    /// palette in ascending community-id order, cycling as needed.
    pub fn assign_colors(mapping: &HashMap<String, i64>) -> HashMap<String, String> {
        let mut ids: Vec<i64> = mapping.values().copied().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut community_colors: HashMap<i64, &str> = HashMap::new();
        let mut palette_idx = 0;
        for id in ids {
            if id == OTHER_COMMUNITY {
                community_colors.insert(id, OTHER_COLOR);
            } else {
                community_colors.insert(id, COMMUNITY_COLORS[palette_idx % COMMUNITY_COLORS.len()]);
                palette_idx += 1;
            }
        }

        mapping
            .iter()
            .map(|(node, community)| {
                (node.clone(), community_colors[community].to_string())
            })
            .collect()
    }

    /// Per-community summaries, ordered by community id
    pub fn metadata(
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        mapping: &HashMap<String, i64>,
    ) -> Vec<CommunityMetadata> {
        let mut members: BTreeMap<i64, Vec<&GraphNode>> = BTreeMap::new();
        for node in nodes {
            let community = mapping.get(&node.id).copied().unwrap_or(OTHER_COMMUNITY);
            members.entry(community).or_default().push(node);
        }

        let mut metadata = Vec::with_capacity(members.len());

        for (community_id, community_nodes) in members {
            let node_ids: Vec<String> = community_nodes.iter().map(|n| n.id.clone()).collect();
            let id_set: std::collections::HashSet<&str> =
                node_ids.iter().map(String::as_str).collect();

            let internal = edges
                .iter()
                .filter(|e| id_set.contains(e.source.as_str()) && id_set.contains(e.target.as_str()))
                .count();
            let external = edges
                .iter()
                .filter(|e| {
                    id_set.contains(e.source.as_str()) != id_set.contains(e.target.as_str())
                })
                .count();
            let total = internal + external;
            let cohesion = if total > 0 {
                internal as f64 / total as f64
            } else {
                0.0
            };

            let mut type_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for node in &community_nodes {
                *type_counts.entry(node.node_type.as_str()).or_insert(0) += 1;
            }
            let dominant_type = type_counts
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(t, _)| t.to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());

            let mut by_weight: Vec<&&GraphNode> = community_nodes.iter().collect();
            by_weight.sort_by(|a, b| {
                b.weight
                    .total_cmp(&a.weight)
                    .then_with(|| a.id.cmp(&b.id))
            });
            let top_entities: Vec<String> =
                by_weight.iter().take(5).map(|n| n.id.clone()).collect();

            metadata.push(CommunityMetadata {
                community_id,
                size: community_nodes.len(),
                internal_edges: internal,
                external_edges: external,
                cohesion,
                dominant_type,
                node_ids,
                top_entities,
            });
        }

        metadata
    }

    /// Collapse small communities into super-nodes for a zoomed-out view
    ///
    /// Communities with at least `min_size` members keep their nodes;
    /// smaller ones become one super-node each. Super-edges sum the
    /// underlying weights, drop self-loops, and carry strength
    /// `aggregated_weight / 10`.
    pub fn super_nodes(
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        mapping: &HashMap<String, i64>,
        min_size: usize,
    ) -> (Vec<SuperNode>, Vec<GraphEdge>) {
        let mut members: BTreeMap<i64, Vec<&GraphNode>> = BTreeMap::new();
        for node in nodes {
            let community = mapping.get(&node.id).copied().unwrap_or(OTHER_COMMUNITY);
            members.entry(community).or_default().push(node);
        }

        let mut super_nodes = Vec::new();
        let mut node_to_super: HashMap<&str, String> = HashMap::new();

        for (community_id, community_nodes) in &members {
            if community_nodes.len() >= min_size {
                for node in community_nodes {
                    super_nodes.push(SuperNode {
                        id: node.id.clone(),
                        label: node.label.clone(),
                        node_type: node.node_type.clone(),
                        weight: node.weight,
                        is_super_node: false,
                        member_ids: Vec::new(),
                    });
                    node_to_super.insert(node.id.as_str(), node.id.clone());
                }
            } else {
                let super_id = format!("community_{community_id}");
                let total_weight: f64 = community_nodes.iter().map(|n| n.weight).sum();

                super_nodes.push(SuperNode {
                    id: super_id.clone(),
                    label: format!(
                        "Cluster {community_id} ({} entities)",
                        community_nodes.len()
                    ),
                    node_type: "COMMUNITY".to_string(),
                    weight: total_weight,
                    is_super_node: true,
                    member_ids: community_nodes.iter().map(|n| n.id.clone()).collect(),
                });
                for node in community_nodes {
                    node_to_super.insert(node.id.as_str(), super_id.clone());
                }
            }
        }

        // Re-aggregate edges between the collapsed endpoints
        let mut aggregated: BTreeMap<(String, String), f64> = BTreeMap::new();
        for edge in edges {
            let (Some(source), Some(target)) = (
                node_to_super.get(edge.source.as_str()),
                node_to_super.get(edge.target.as_str()),
            ) else {
                continue;
            };
            if source == target {
                continue;
            }

            let key = if source <= target {
                (source.clone(), target.clone())
            } else {
                (target.clone(), source.clone())
            };
            *aggregated.entry(key).or_insert(0.0) += edge.weight();
        }

        let super_edges: Vec<GraphEdge> = aggregated
            .into_iter()
            .map(|((source, target), weight)| GraphEdge {
                source,
                target,
                strength: Some(weight / 10.0),
                npmi: None,
                proximity_weight: None,
            })
            .collect();

        (super_nodes, super_edges)
    }
}

// =============================================================================
// Louvain
// =============================================================================

/// One level of the hierarchy: symmetric adjacency plus aggregated
/// self-loop weights
struct LevelGraph {
    adj: Vec<Vec<(usize, f64)>>,
    self_loop: Vec<f64>,
}

impl LevelGraph {
    fn node_count(&self) -> usize {
        self.adj.len()
    }

    /// Weighted degree including self-loops (which count twice)
    fn degrees(&self) -> Vec<f64> {
        (0..self.adj.len())
            .map(|i| {
                self.adj[i].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self.self_loop[i]
            })
            .collect()
    }
}

/// Seeded Louvain over the entity graph. Returns node-index groups, or
/// None when the graph carries no usable weight.
fn louvain(graph: &EntityGraph, resolution: f64) -> Option<Vec<Vec<super::NodeIndex>>> {
    let n = graph.node_count();
    if n == 0 {
        return Some(Vec::new());
    }

    let mut level = LevelGraph {
        adj: (0..n)
            .map(|i| {
                graph
                    .neighbors(super::NodeIndex::new(i))
                    .into_iter()
                    .map(|(idx, w)| (idx.index(), w))
                    .collect()
            })
            .collect(),
        self_loop: vec![0.0; n],
    };

    if level.degrees().iter().sum::<f64>() <= 0.0 {
        return None;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(LOUVAIN_SEED);
    // Original node -> its node in the current level
    let mut membership: Vec<usize> = (0..n).collect();

    loop {
        let community = local_moving(&level, resolution, &mut rng);

        let mut ids: Vec<usize> = community.clone();
        ids.sort_unstable();
        ids.dedup();

        if ids.len() == level.node_count() {
            break;
        }

        let remap: HashMap<usize, usize> =
            ids.iter().enumerate().map(|(dense, &id)| (id, dense)).collect();

        for slot in membership.iter_mut() {
            *slot = remap[&community[*slot]];
        }

        level = aggregate(&level, &community, &remap, ids.len());
    }

    let mut groups: BTreeMap<usize, Vec<super::NodeIndex>> = BTreeMap::new();
    for (node, &community) in membership.iter().enumerate() {
        groups
            .entry(community)
            .or_default()
            .push(super::NodeIndex::new(node));
    }

    Some(groups.into_values().collect())
}

/// Phase one: move nodes between communities while modularity improves
fn local_moving(level: &LevelGraph, resolution: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let n = level.node_count();
    let k = level.degrees();
    let two_m: f64 = k.iter().sum();

    let mut community: Vec<usize> = (0..n).collect();
    let mut sigma_tot = k.clone();

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    loop {
        let mut moved = false;

        for &node in &order {
            let current = community[node];

            // Weight from this node to each neighboring community
            let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
            for &(neighbor, w) in &level.adj[node] {
                if neighbor != node {
                    *weights.entry(community[neighbor]).or_insert(0.0) += w;
                }
            }

            sigma_tot[current] -= k[node];

            let gain_of = |comm: usize, w: f64| w - resolution * sigma_tot[comm] * k[node] / two_m;

            let mut best = current;
            let mut best_gain = gain_of(current, weights.get(&current).copied().unwrap_or(0.0));

            for (&comm, &w) in &weights {
                if comm == current {
                    continue;
                }
                let gain = gain_of(comm, w);
                if gain > best_gain + 1e-12 {
                    best = comm;
                    best_gain = gain;
                }
            }

            sigma_tot[best] += k[node];
            if best != current {
                community[node] = best;
                moved = true;
            }
        }

        if !moved {
            break;
        }
    }

    community
}

/// Phase two: collapse each community into a single node
fn aggregate(
    level: &LevelGraph,
    community: &[usize],
    remap: &HashMap<usize, usize>,
    community_count: usize,
) -> LevelGraph {
    let mut next = LevelGraph {
        adj: vec![Vec::new(); community_count],
        self_loop: vec![0.0; community_count],
    };

    let mut pair_weights: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for u in 0..level.node_count() {
        let cu = remap[&community[u]];
        next.self_loop[cu] += level.self_loop[u];

        for &(v, w) in &level.adj[u] {
            // Each undirected edge is stored in both adjacency lists
            if v < u {
                continue;
            }
            let cv = remap[&community[v]];
            if cu == cv {
                next.self_loop[cu] += w;
            } else {
                let key = (cu.min(cv), cu.max(cv));
                *pair_weights.entry(key).or_insert(0.0) += w;
            }
        }
    }

    for ((a, b), w) in pair_weights {
        next.adj[a].push((b, w));
        next.adj[b].push((a, w));
    }

    next
}

// =============================================================================
// Tests
// =============================================================================
