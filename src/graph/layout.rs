//! Force-directed layout with a stable viewport cache
//!
//! Fruchterman-Reingold over the weighted graph, seeded for
//! reproducibility, scaled into the requested viewport so every
//! coordinate lands inside `[0, width] x [0, height]`. Layouts are cached
//! under a SHA-256 key of the article id and the viewport rounded to a
//! 100 px grid.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::EntityGraph;
use crate::config::LayoutConfig;
use crate::types::{GraphEdge, GraphNode};

pub type Positions = BTreeMap<String, (f64, f64)>;

// =============================================================================
// LayoutComputer
// =============================================================================

pub struct LayoutComputer {
    config: LayoutConfig,
}

impl Default for LayoutComputer {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl LayoutComputer {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// Compute viewport coordinates for every node
    ///
    /// Never fails: a degenerate spring result falls back to a seeded
    /// random layout before viewport mapping.
    pub fn compute(
        &self,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        width: f64,
        height: f64,
    ) -> Positions {
        if nodes.is_empty() {
            return Positions::new();
        }

        let graph = EntityGraph::from_parts(nodes, edges);
        let n = graph.node_count();

        let mut coords = self.spring_layout(&graph);

        if coords.iter().any(|&(x, y)| !x.is_finite() || !y.is_finite()) {
            warn!("spring layout produced non-finite coordinates, falling back to random");
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
            coords = (0..n)
                .map(|_| (rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
                .collect();
        }

        rescale_to_unit(&mut coords);

        // Affine map: (-1,-1) -> (0,0), (1,1) -> (width, height)
        graph
            .node_indices()
            .map(|idx| {
                let (x, y) = coords[idx.index()];
                (
                    graph.id_of(idx).to_string(),
                    ((x + 1.0) * width / 2.0, (y + 1.0) * height / 2.0),
                )
            })
            .collect()
    }

    /// Fruchterman-Reingold iterations in the unit domain
    fn spring_layout(&self, graph: &EntityGraph) -> Vec<(f64, f64)> {
        let n = graph.node_count();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut pos: Vec<(f64, f64)> = (0..n)
            .map(|_| (rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)))
            .collect();

        if n == 1 {
            return pos;
        }

        let k = self
            .config
            .optimal_distance
            .unwrap_or_else(|| 1.0 / (n as f64).sqrt());

        // Spring strength per edge: clamp(weight * 10, 0.1, 10)
        let springs: Vec<(usize, usize, f64)> = graph
            .edges()
            .into_iter()
            .map(|(a, b, w)| (a.index(), b.index(), (w * 10.0).clamp(0.1, 10.0)))
            .collect();

        let mut temperature = 0.1;
        let cooling = temperature / (self.config.iterations as f64 + 1.0);

        for _ in 0..self.config.iterations {
            let mut disp = vec![(0.0, 0.0); n];

            // Repulsion between every pair
            for i in 0..n {
                for j in (i + 1)..n {
                    let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                    let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                    let force = k * k / (dist * dist);
                    disp[i].0 += dx / dist * force;
                    disp[i].1 += dy / dist * force;
                    disp[j].0 -= dx / dist * force;
                    disp[j].1 -= dy / dist * force;
                }
            }

            // Attraction along edges, scaled by spring strength
            for &(i, j, strength) in &springs {
                let (dx, dy) = (pos[i].0 - pos[j].0, pos[i].1 - pos[j].1);
                let dist = (dx * dx + dy * dy).sqrt().max(0.01);
                let force = strength * dist * dist / k;
                disp[i].0 -= dx / dist * force;
                disp[i].1 -= dy / dist * force;
                disp[j].0 += dx / dist * force;
                disp[j].1 += dy / dist * force;
            }

            // Cap displacement by the cooling temperature
            for i in 0..n {
                let (dx, dy) = disp[i];
                let length = (dx * dx + dy * dy).sqrt();
                if length > 0.0 {
                    let capped = length.min(temperature);
                    pos[i].0 += dx / length * capped;
                    pos[i].1 += dy / length * capped;
                }
            }

            temperature -= cooling;
        }

        pos
    }
}

/// Center coordinates and scale the larger extent to exactly [-1, 1]
fn rescale_to_unit(coords: &mut [(f64, f64)]) {
    if coords.is_empty() {
        return;
    }

    let n = coords.len() as f64;
    let mean_x = coords.iter().map(|c| c.0).sum::<f64>() / n;
    let mean_y = coords.iter().map(|c| c.1).sum::<f64>() / n;

    let mut limit: f64 = 0.0;
    for coord in coords.iter_mut() {
        coord.0 -= mean_x;
        coord.1 -= mean_y;
        limit = limit.max(coord.0.abs()).max(coord.1.abs());
    }

    if limit > 0.0 {
        for coord in coords.iter_mut() {
            coord.0 /= limit;
            coord.1 /= limit;
        }
    }
}

// =============================================================================
// Layout cache
// =============================================================================

/// One cached layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutCacheEntry {
    pub cache_key: String,
    pub article_id: i64,
    pub layout: Positions,
    pub computed_at: DateTime<Utc>,
}

/// In-memory layout cache with TTL semantics; one entry per key, newer
/// wins
#[derive(Debug)]
pub struct LayoutCache {
    entries: HashMap<String, LayoutCacheEntry>,
    ttl: Duration,
    viewport_rounding: u32,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(24, 100)
    }
}

impl LayoutCache {
    pub fn new(ttl_hours: i64, viewport_rounding: u32) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Duration::hours(ttl_hours),
            viewport_rounding: viewport_rounding.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache key: hex SHA-256 of `article_<id>_w<W>_h<H>` with both
    /// dimensions rounded to the viewport grid
    pub fn cache_key(&self, article_id: i64, width: f64, height: f64) -> String {
        let grid = self.viewport_rounding as f64;
        let rounded_w = ((width / grid).round() * grid) as i64;
        let rounded_h = ((height / grid).round() * grid) as i64;

        let mut hasher = Sha256::new();
        hasher.update(format!("article_{article_id}_w{rounded_w}_h{rounded_h}").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fresh cached positions, if any
    pub fn get(&self, article_id: i64, width: f64, height: f64) -> Option<&Positions> {
        let key = self.cache_key(article_id, width, height);

        match self.entries.get(&key) {
            Some(entry) if Utc::now() - entry.computed_at < self.ttl => {
                info!(article_id, key = %&key[..12], "layout cache HIT");
                Some(&entry.layout)
            }
            _ => {
                info!(article_id, key = %&key[..12], "layout cache MISS");
                None
            }
        }
    }

    /// Upsert a layout under its key; the newer entry wins
    pub fn put(&mut self, article_id: i64, width: f64, height: f64, layout: Positions) {
        let cache_key = self.cache_key(article_id, width, height);
        self.entries.insert(
            cache_key.clone(),
            LayoutCacheEntry {
                cache_key,
                article_id,
                layout,
                computed_at: Utc::now(),
            },
        );
    }

    /// Drop entries past their TTL. Returns the number evicted.
    pub fn evict_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        let now = Utc::now();
        self.entries.retain(|_, entry| now - entry.computed_at < ttl);
        before - self.entries.len()
    }

    /// Test-and-maintenance access to a raw entry
    pub fn insert_entry(&mut self, entry: LayoutCacheEntry) {
        self.entries.insert(entry.cache_key.clone(), entry);
    }
}

/// Compute through the cache: return fresh positions when cached,
/// otherwise compute, store, and return.
pub fn compute_cached(
    computer: &LayoutComputer,
    cache: &mut LayoutCache,
    article_id: i64,
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    width: f64,
    height: f64,
) -> Positions {
    if let Some(cached) = cache.get(article_id, width, height) {
        return cached.clone();
    }

    let positions = computer.compute(nodes, edges, width, height);
    cache.put(article_id, width, height, positions.clone());
    positions
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

    fn sample() -> (Vec<GraphNode>, Vec<GraphEdge>) {
        (
            vec![node("a"), node("b"), node("c"), node("d")],
            vec![
                edge("a", "b", 0.9),
                edge("b", "c", 0.5),
                edge("c", "d", 0.7),
                edge("a", "d", 0.2),
            ],
        )
    }

    // -------------------------------------------------------------------------
    // Layout
    // -------------------------------------------------------------------------

    #[test]
    fn test_layout_within_viewport() {
        let (nodes, edges) = sample();
        let positions = LayoutComputer::default().compute(&nodes, &edges, 1200.0, 600.0);

        assert_eq!(positions.len(), 4);
        for (id, &(x, y)) in &positions {
            assert!((0.0..=1200.0).contains(&x), "{id} x={x} out of viewport");
            assert!((0.0..=600.0).contains(&y), "{id} y={y} out of viewport");
        }
    }

    #[test]
    fn test_layout_deterministic() {
        let (nodes, edges) = sample();
        let computer = LayoutComputer::default();

        let first = computer.compute(&nodes, &edges, 800.0, 600.0);
        let second = computer.compute(&nodes, &edges, 800.0, 600.0);

        assert_eq!(first, second, "seeded layout must be bit-identical");
    }

    #[test]
    fn test_layout_single_node_centered() {
        let positions = LayoutComputer::default().compute(&[node("solo")], &[], 1000.0, 500.0);

        let &(x, y) = positions.get("solo").unwrap();
        assert!((x - 500.0).abs() < 1e-9);
        assert!((y - 250.0).abs() < 1e-9);
    }

    #[test]
    fn test_layout_empty() {
        let positions = LayoutComputer::default().compute(&[], &[], 800.0, 600.0);
        assert!(positions.is_empty());
    }

    #[test]
    fn test_layout_spreads_nodes() {
        let (nodes, edges) = sample();
        let positions = LayoutComputer::default().compute(&nodes, &edges, 1000.0, 1000.0);

        let coords: Vec<&(f64, f64)> = positions.values().collect();
        for i in 0..coords.len() {
            for j in (i + 1)..coords.len() {
                let dx = coords[i].0 - coords[j].0;
                let dy = coords[i].1 - coords[j].1;
                assert!(
                    (dx * dx + dy * dy).sqrt() > 1.0,
                    "nodes should not collapse onto each other"
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cache keys
    // -------------------------------------------------------------------------

    #[test]
    fn test_cache_key_rounds_to_grid() {
        let cache = LayoutCache::default();

        // 1203x617 and 1249x583 both round to 1200x600
        let key_a = cache.cache_key(42, 1203.0, 617.0);
        let key_b = cache.cache_key(42, 1249.0, 583.0);
        assert_eq!(key_a, key_b);

        let key_c = cache.cache_key(42, 1251.0, 617.0);
        assert_ne!(key_a, key_c, "1251 rounds to 1300");
    }

    #[test]
    fn test_cache_key_distinguishes_articles() {
        let cache = LayoutCache::default();
        assert_ne!(cache.cache_key(1, 1200.0, 600.0), cache.cache_key(2, 1200.0, 600.0));
    }

    #[test]
    fn test_cache_key_is_sha256_hex() {
        let cache = LayoutCache::default();
        let key = cache.cache_key(42, 1200.0, 600.0);

        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // -------------------------------------------------------------------------
    // Cache behavior
    // -------------------------------------------------------------------------

    #[test]
    fn test_cache_roundtrip() {
        let (nodes, edges) = sample();
        let computer = LayoutComputer::default();
        let mut cache = LayoutCache::default();

        let first = compute_cached(&computer, &mut cache, 42, &nodes, &edges, 1200.0, 600.0);
        assert_eq!(cache.len(), 1);

        // Warm read with near-identical viewport returns identical positions
        let second = compute_cached(&computer, &mut cache, 42, &nodes, &edges, 1203.0, 617.0);
        assert_eq!(first, second);
    }

    #[test]
    fn test_cache_expiry() {
        let mut cache = LayoutCache::default();
        let key = cache.cache_key(42, 1200.0, 600.0);

        cache.insert_entry(LayoutCacheEntry {
            cache_key: key,
            article_id: 42,
            layout: Positions::new(),
            computed_at: Utc::now() - Duration::hours(25),
        });

        assert!(cache.get(42, 1200.0, 600.0).is_none(), "expired entries do not hit");
        assert_eq!(cache.evict_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_newer_wins() {
        let mut cache = LayoutCache::default();

        let mut old = Positions::new();
        old.insert("a".to_string(), (1.0, 1.0));
        cache.put(42, 1200.0, 600.0, old);

        let mut new = Positions::new();
        new.insert("a".to_string(), (2.0, 2.0));
        cache.put(42, 1200.0, 600.0, new);

        assert_eq!(cache.len(), 1);
        let cached = cache.get(42, 1200.0, 600.0).unwrap();
        assert_eq!(cached["a"], (2.0, 2.0));
    }
}
