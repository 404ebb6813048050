//! PMI / NPMI scoring with a proximity-only fallback for rare entities
//!
//! PMI measures how much more often two entities appear together than
//! chance would predict: `PMI = log(P(x,y) / (P(x) * P(y)))`. NPMI
//! normalizes by the pair's self-information into roughly [-1, 1].
//! Entities below the frequency floor get proximity-only scores instead,
//! since PMI is unstable for them.
//!
//! Note on probabilities: callers are free to feed per-article counts for
//! the joint term and per-article sentence frequencies for the marginals
//! (the relationship generator does exactly that). The result is a useful
//! heuristic rather than textbook corpus PMI.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Fact, ScoringMethod};

// =============================================================================
// Types
// =============================================================================

/// Observation for one entity pair, as assembled from a co-occurrence
/// matrix: rounded count, mean per-side confidence, total proximity weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairObservation {
    pub count: u64,
    pub confidence_a: f64,
    pub confidence_b: f64,
    pub proximity_weight: f64,
}

/// Result of scoring one entity pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmiScore {
    pub entity_a: String,
    pub entity_b: String,
    /// Raw PMI (unbounded), None for rare entities
    pub pmi: Option<f64>,
    /// Normalized PMI in roughly [-1, 1], None for rare entities
    pub npmi: Option<f64>,
    /// Final scoring metric: confidence-adjusted PMI, or the proximity
    /// fallback for rare pairs
    pub pmi_score: f64,
    pub p_xy: f64,
    pub p_x: f64,
    pub p_y: f64,
    pub raw_count: u64,
    pub is_rare_entity: bool,
    pub scoring_method: ScoringMethod,
}

impl PmiScore {
    /// Normalized score used by the thresholder: NPMI when present,
    /// otherwise the proximity score squeezed into [0, 1].
    pub fn score(&self) -> f64 {
        match self.npmi {
            Some(npmi) => npmi,
            None => (self.pmi_score / 10.0).min(1.0),
        }
    }
}

/// Summary statistics over a batch of scores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmiStatistics {
    pub count: usize,
    pub pmi_scored: usize,
    pub proximity_scored: usize,
    pub min_pmi: f64,
    pub max_pmi: f64,
    pub mean_pmi: f64,
    pub min_npmi: f64,
    pub max_npmi: f64,
    pub mean_npmi: f64,
}

// =============================================================================
// PmiCalculator
// =============================================================================

pub struct PmiCalculator {
    smoothing: f64,
    min_frequency_for_pmi: usize,
}

impl Default for PmiCalculator {
    fn default() -> Self {
        Self::new(1e-6, 2)
    }
}

impl PmiCalculator {
    /// `smoothing` is the Laplace factor guarding every log and division;
    /// pairs where either entity's frequency falls below
    /// `min_frequency_for_pmi` are scored proximity-only.
    pub fn new(smoothing: f64, min_frequency_for_pmi: usize) -> Self {
        Self {
            smoothing,
            min_frequency_for_pmi,
        }
    }

    /// True when both entities are frequent enough for stable PMI
    pub fn should_use_pmi(&self, freq_a: usize, freq_b: usize) -> bool {
        freq_a >= self.min_frequency_for_pmi && freq_b >= self.min_frequency_for_pmi
    }

    /// Score one entity pair
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &self,
        entity_a: &str,
        entity_b: &str,
        cooccurrence_count: u64,
        freq_a: usize,
        freq_b: usize,
        total_documents: usize,
        confidence_a: f64,
        confidence_b: f64,
        proximity_weight: f64,
    ) -> PmiScore {
        let eps = self.smoothing;
        let n = total_documents as f64;

        let p_xy = (cooccurrence_count as f64 + eps) / (n + eps);
        let p_x = (freq_a as f64 + eps) / (n + eps);
        let p_y = (freq_b as f64 + eps) / (n + eps);

        let avg_confidence = (confidence_a + confidence_b) / 2.0;

        if self.should_use_pmi(freq_a, freq_b) {
            let pmi = (p_xy / (p_x * p_y + eps) + eps).ln();
            let npmi = pmi / (-(p_xy + eps).ln() + eps);

            PmiScore {
                entity_a: entity_a.to_string(),
                entity_b: entity_b.to_string(),
                pmi: Some(pmi),
                npmi: Some(npmi),
                pmi_score: pmi * avg_confidence,
                p_xy,
                p_x,
                p_y,
                raw_count: cooccurrence_count,
                is_rare_entity: false,
                scoring_method: ScoringMethod::Pmi,
            }
        } else {
            debug!(
                entity_a,
                entity_b, freq_a, freq_b, "using proximity-only scoring for rare pair"
            );

            PmiScore {
                entity_a: entity_a.to_string(),
                entity_b: entity_b.to_string(),
                pmi: None,
                npmi: None,
                pmi_score: proximity_weight * avg_confidence,
                p_xy,
                p_x,
                p_y,
                raw_count: cooccurrence_count,
                is_rare_entity: true,
                scoring_method: ScoringMethod::ProximityOnly,
            }
        }
    }

    /// Score every pair in an observation map
    ///
    /// Entities missing from `frequencies` default to frequency 1, which
    /// routes their pairs through the proximity-only branch.
    pub fn calculate_batch(
        &self,
        observations: &BTreeMap<(String, String), PairObservation>,
        frequencies: &HashMap<String, usize>,
        total_documents: usize,
    ) -> BTreeMap<(String, String), PmiScore> {
        let mut scores = BTreeMap::new();

        for ((entity_a, entity_b), obs) in observations {
            let freq_a = frequencies.get(entity_a).copied().unwrap_or(1);
            let freq_b = frequencies.get(entity_b).copied().unwrap_or(1);

            let score = self.calculate(
                entity_a,
                entity_b,
                obs.count,
                freq_a,
                freq_b,
                total_documents,
                obs.confidence_a,
                obs.confidence_b,
                obs.proximity_weight,
            );
            scores.insert((entity_a.clone(), entity_b.clone()), score);
        }

        scores
    }

    /// Corpus-level document frequencies: for each entity form, the number
    /// of distinct articles containing it at least once.
    pub fn corpus_frequencies(
        article_facts: &BTreeMap<i64, Vec<Fact>>,
    ) -> (HashMap<String, usize>, usize) {
        let mut counts: HashMap<String, usize> = HashMap::new();

        for facts in article_facts.values() {
            let mut seen: Vec<&str> = Vec::new();
            for fact in facts {
                if !seen.contains(&fact.form.as_str()) {
                    seen.push(&fact.form);
                    *counts.entry(fact.form.clone()).or_insert(0) += 1;
                }
            }
        }

        (counts, article_facts.len())
    }

    /// Summary statistics for a score batch
    pub fn statistics(scores: &BTreeMap<(String, String), PmiScore>) -> PmiStatistics {
        let pmis: Vec<f64> = scores.values().filter_map(|s| s.pmi).collect();
        let npmis: Vec<f64> = scores.values().filter_map(|s| s.npmi).collect();
        let proximity_scored = scores.values().filter(|s| s.is_rare_entity).count();

        let mean = |xs: &[f64]| {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f64>() / xs.len() as f64
            }
        };
        let min = |xs: &[f64]| xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = |xs: &[f64]| xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        PmiStatistics {
            count: scores.len(),
            pmi_scored: scores.len() - proximity_scored,
            proximity_scored,
            min_pmi: if pmis.is_empty() { 0.0 } else { min(&pmis) },
            max_pmi: if pmis.is_empty() { 0.0 } else { max(&pmis) },
            mean_pmi: mean(&pmis),
            min_npmi: if npmis.is_empty() { 0.0 } else { min(&npmis) },
            max_npmi: if npmis.is_empty() { 0.0 } else { max(&npmis) },
            mean_npmi: mean(&npmis),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
