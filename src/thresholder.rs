//! Size-adaptive edge filtering
//!
//! Converts a large candidate edge set for one article into a curated
//! subset whose density matches the article's size. Small articles get
//! permissive thresholds so sparse networks keep their few connections;
//! large articles get aggressive filtering so they don't render as
//! hairballs.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::CandidateEdge;

// =============================================================================
// Size categories
// =============================================================================

/// Article size category by unique entity count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleSize {
    Small,
    Medium,
    Large,
}

impl ArticleSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleSize::Small => "small",
            ArticleSize::Medium => "medium",
            ArticleSize::Large => "large",
        }
    }
}

/// Threshold configuration for one size category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Minimum normalized score (NPMI, or proximity score for rare pairs)
    pub min_score: f64,
    /// Percentile of surviving scores that stage 2 cuts at
    pub percentile_cutoff: f64,
    /// Maximum connections per entity after stage 3
    pub max_edges_per_entity: usize,
}

/// Size boundaries plus the per-category configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub small_max: usize,
    pub medium_max: usize,
    pub small: ThresholdConfig,
    pub medium: ThresholdConfig,
    pub large: ThresholdConfig,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            small_max: 10,
            medium_max: 25,
            small: ThresholdConfig {
                min_score: 0.3,
                percentile_cutoff: 70.0,
                max_edges_per_entity: 5,
            },
            medium: ThresholdConfig {
                min_score: 0.5,
                percentile_cutoff: 60.0,
                max_edges_per_entity: 8,
            },
            large: ThresholdConfig {
                min_score: 0.6,
                percentile_cutoff: 50.0,
                max_edges_per_entity: 10,
            },
        }
    }
}

impl ThresholdTable {
    pub fn size_for(&self, entity_count: usize) -> ArticleSize {
        if entity_count <= self.small_max {
            ArticleSize::Small
        } else if entity_count <= self.medium_max {
            ArticleSize::Medium
        } else {
            ArticleSize::Large
        }
    }

    pub fn config_for(&self, entity_count: usize) -> &ThresholdConfig {
        match self.size_for(entity_count) {
            ArticleSize::Small => &self.small,
            ArticleSize::Medium => &self.medium,
            ArticleSize::Large => &self.large,
        }
    }
}

/// Outcome summary of one filtering run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteringSummary {
    pub article_size: ArticleSize,
    pub entity_count: usize,
    pub original_edge_count: usize,
    pub filtered_edge_count: usize,
    pub reduction_percentage: f64,
}

// =============================================================================
// DynamicThresholder
// =============================================================================

/// Three-stage edge filter: absolute threshold, percentile cutoff,
/// per-node degree cap, with a top-3 fallback when stage 1 empties the
/// candidate set.
pub struct DynamicThresholder {
    table: ThresholdTable,
}

impl Default for DynamicThresholder {
    fn default() -> Self {
        Self::new(ThresholdTable::default())
    }
}

impl DynamicThresholder {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    /// Filter candidates using the table entry for the article's size
    pub fn filter_edges(&self, edges: Vec<CandidateEdge>, entity_count: usize) -> Vec<CandidateEdge> {
        let config = self.table.config_for(entity_count).clone();
        let size = self.table.size_for(entity_count);

        info!(
            candidates = edges.len(),
            entity_count,
            size = size.as_str(),
            "filtering edges"
        );

        self.filter_with_config(edges, &config)
    }

    /// Filter candidates with an explicit configuration
    pub fn filter_with_config(
        &self,
        edges: Vec<CandidateEdge>,
        config: &ThresholdConfig,
    ) -> Vec<CandidateEdge> {
        if edges.is_empty() {
            return Vec::new();
        }

        // Stage 1: absolute threshold
        let candidates: Vec<CandidateEdge> = edges
            .iter()
            .filter(|e| e.score >= config.min_score)
            .cloned()
            .collect();

        if candidates.is_empty() {
            // Fallback: the threshold was too strict for this article,
            // keep the top 3 strongest edges from the original list
            warn!("no edges passed the absolute threshold, falling back to top 3");
            let mut fallback = edges;
            fallback.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| b.confidence_avg.total_cmp(&a.confidence_avg))
                    .then_with(|| (&a.source, &a.target).cmp(&(&b.source, &b.target)))
            });
            fallback.truncate(3);
            return fallback;
        }

        // Stage 2: percentile cutoff among the survivors
        let scores: Vec<f64> = candidates.iter().map(|e| e.score).collect();
        let cutoff = percentile(&scores, config.percentile_cutoff);
        let candidates: Vec<CandidateEdge> = candidates
            .into_iter()
            .filter(|e| e.score >= cutoff)
            .collect();

        // Stage 3: per-node degree cap
        Self::degree_cap(candidates, config.max_edges_per_entity)
    }

    /// Greedily keep edges strongest-first while no endpoint exceeds
    /// `max_degree` connections. This is the hub-flattening stage.
    pub fn degree_cap(mut edges: Vec<CandidateEdge>, max_degree: usize) -> Vec<CandidateEdge> {
        edges.sort_by(|a, b| {
            let sa = a.score * a.confidence_avg;
            let sb = b.score * b.confidence_avg;
            sb.total_cmp(&sa)
                .then_with(|| (&a.source, &a.target).cmp(&(&b.source, &b.target)))
        });

        let mut degrees: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        let mut kept_index = Vec::new();

        for (idx, edge) in edges.iter().enumerate() {
            let src = degrees.get(edge.source.as_str()).copied().unwrap_or(0);
            let tgt = degrees.get(edge.target.as_str()).copied().unwrap_or(0);

            if src < max_degree && tgt < max_degree {
                kept_index.push(idx);
                *degrees.entry(edge.source.as_str()).or_insert(0) += 1;
                *degrees.entry(edge.target.as_str()).or_insert(0) += 1;
            }
        }

        let mut kept = Vec::with_capacity(kept_index.len());
        for idx in kept_index.into_iter().rev() {
            kept.push(edges.swap_remove(idx));
        }
        kept.reverse();
        kept
    }

    /// Summary of a filtering run for reporting
    pub fn summary(
        &self,
        original_count: usize,
        filtered_count: usize,
        entity_count: usize,
    ) -> FilteringSummary {
        let reduction = if original_count > 0 {
            (original_count - filtered_count) as f64 / original_count as f64 * 100.0
        } else {
            0.0
        };

        FilteringSummary {
            article_size: self.table.size_for(entity_count),
            entity_count,
            original_edge_count: original_count,
            filtered_edge_count: filtered_count,
            reduction_percentage: reduction,
        }
    }

    /// Rough estimate of edge counts before and after filtering
    pub fn estimate_edge_count(&self, entity_count: usize) -> (usize, usize) {
        let naive = entity_count * entity_count.saturating_sub(1) / 2;
        let config = self.table.config_for(entity_count);

        let after_percentile =
            (naive as f64 * (100.0 - config.percentile_cutoff) / 100.0) as usize;
        let degree_cap_limit = config.max_edges_per_entity * entity_count / 2;

        (naive, after_percentile.min(degree_cap_limit))
    }
}

// =============================================================================
// Percentile
// =============================================================================

/// Linear-interpolation percentile over unsorted values
///
/// # Arguments
/// * `values` - Sample values (need not be sorted)
/// * `p` - Percentile in [0, 100]
#[inline]
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let fraction = rank - lo as f64;

    sorted[lo] + (sorted[hi] - sorted[lo]) * fraction
}

// =============================================================================
// Tests
// =============================================================================
