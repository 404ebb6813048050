//! Core configuration
//!
//! One immutable `CoreConfig` carries every tunable of the pipeline; no
//! stage reads process-wide state. All defaults match the documented
//! configuration surface.

use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceMode;
use crate::thresholder::ThresholdTable;

/// Top-level configuration for the relationship core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Sentence window for co-occurrence. Default: 2
    pub window_size: usize,
    /// Laplace smoothing factor for PMI. Default: 1e-6
    pub smoothing: f64,
    /// Minimum entity frequency for PMI scoring. Default: 2
    pub min_frequency_for_pmi: usize,
    /// Size-adaptive edge filtering thresholds
    pub thresholds: ThresholdTable,
    /// Confidence combination strategy. Default: harmonic
    pub confidence_mode: ConfidenceMode,
    pub wikidata: WikidataBoostConfig,
    pub confidence_filter: ConfidenceFilterConfig,
    pub community: CommunityConfig,
    pub layout: LayoutConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            window_size: 2,
            smoothing: 1e-6,
            min_frequency_for_pmi: 2,
            thresholds: ThresholdTable::default(),
            confidence_mode: ConfidenceMode::default(),
            wikidata: WikidataBoostConfig::default(),
            confidence_filter: ConfidenceFilterConfig::default(),
            community: CommunityConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

/// Wikidata confidence boosting (C6)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikidataBoostConfig {
    pub enabled: bool,
    /// Amount added to Wikidata-validated confidences. Default: 0.1
    pub boost_amount: f64,
    /// Ceiling after boosting. Default: 1.0
    pub max_confidence: f64,
}

impl Default for WikidataBoostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            boost_amount: 0.1,
            max_confidence: 1.0,
        }
    }
}

/// Optional confidence-floor filtering of candidate edges
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceFilterConfig {
    pub enabled: bool,
    /// Default: 0.6
    pub min_entity_confidence: f64,
    /// Default: 0.5
    pub min_relationship_confidence: f64,
}

impl Default for ConfidenceFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_entity_confidence: 0.6,
            min_relationship_confidence: 0.5,
        }
    }
}

/// Community detection parameters (C8)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Modularity resolution; higher splits into more communities. Default: 1.0
    pub resolution: f64,
    /// Communities below this size are relabeled to -1. Default: 2
    pub min_community_size: usize,
    /// Communities below this size collapse into super-nodes. Default: 5
    pub super_node_min_size: usize,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            min_community_size: 2,
            super_node_min_size: 5,
        }
    }
}

/// Force-directed layout parameters and cache policy (C10)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Layout iterations. Default: 50
    pub iterations: usize,
    /// Optimal node distance; None picks 1/sqrt(n). Default: None
    pub optimal_distance: Option<f64>,
    /// RNG seed for reproducible layouts. Default: 42
    pub seed: u64,
    /// Cache entry lifetime. Default: 24
    pub cache_ttl_hours: i64,
    /// Viewport dimensions are rounded to this grid for cache keys.
    /// Default: 100
    pub viewport_rounding: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            optimal_distance: None,
            seed: 42,
            cache_ttl_hours: 24,
            viewport_rounding: 100,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
