//! Confidence-driven edge weighting
//!
//! Combines per-entity confidences into an edge confidence, boosts
//! Wikidata-validated entities, and optionally drops low-confidence
//! edges.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{CandidateEdge, Fact};

// =============================================================================
// Combinators
// =============================================================================

/// Strategy for combining two entity confidences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceMode {
    /// `c_a * c_b`: harshly penalizes low confidence
    Multiply,
    /// Harmonic mean: more forgiving than multiply
    Harmonic,
    /// Weakest link: only as strong as the weaker entity
    Minimum,
    /// Simple average
    Average,
}

impl Default for ConfidenceMode {
    fn default() -> Self {
        ConfidenceMode::Harmonic
    }
}

impl ConfidenceMode {
    /// Combined confidence weight for an entity pair
    pub fn combine(&self, confidence_a: f64, confidence_b: f64) -> f64 {
        match self {
            ConfidenceMode::Multiply => confidence_a * confidence_b,
            ConfidenceMode::Harmonic => {
                if confidence_a == 0.0 || confidence_b == 0.0 {
                    0.0
                } else {
                    2.0 / (1.0 / confidence_a + 1.0 / confidence_b)
                }
            }
            ConfidenceMode::Minimum => confidence_a.min(confidence_b),
            ConfidenceMode::Average => (confidence_a + confidence_b) / 2.0,
        }
    }
}

// =============================================================================
// ConfidenceWeighter
// =============================================================================

pub struct ConfidenceWeighter {
    mode: ConfidenceMode,
}

impl Default for ConfidenceWeighter {
    fn default() -> Self {
        Self::new(ConfidenceMode::default())
    }
}

impl ConfidenceWeighter {
    pub fn new(mode: ConfidenceMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ConfidenceMode {
        self.mode
    }

    /// Confidence-adjusted strength for a scored pair
    pub fn weight(&self, score: f64, confidence_a: f64, confidence_b: f64) -> f64 {
        score * self.mode.combine(confidence_a, confidence_b)
    }

    /// Boost confidence for Wikidata-validated facts
    ///
    /// Adds `boost_amount` to every fact carrying a Wikidata ID, clamped
    /// to `max_confidence`. Boosted facts record the applied delta.
    /// Returns the number of facts boosted.
    pub fn boost_wikidata(facts: &mut [Fact], boost_amount: f64, max_confidence: f64) -> usize {
        let mut boosted = 0;

        for fact in facts.iter_mut() {
            if fact.wikidata_id.is_none() {
                continue;
            }
            let original = fact.confidence;
            let new = (original + boost_amount).min(max_confidence);
            if new > original {
                fact.confidence = new;
                fact.confidence_boosted = true;
                fact.confidence_boost = new - original;
                boosted += 1;
            }
        }

        if boosted > 0 {
            info!(boosted, "boosted confidence for Wikidata-validated entities");
        }

        boosted
    }

    /// Drop edges whose entity or averaged confidence falls below the
    /// given floors
    pub fn filter_by_confidence(
        edges: Vec<CandidateEdge>,
        min_entity_confidence: f64,
        min_relationship_confidence: f64,
    ) -> Vec<CandidateEdge> {
        let before = edges.len();

        let filtered: Vec<CandidateEdge> = edges
            .into_iter()
            .filter(|edge| {
                edge.confidence_a >= min_entity_confidence
                    && edge.confidence_b >= min_entity_confidence
                    && (edge.confidence_a + edge.confidence_b) / 2.0
                        >= min_relationship_confidence
            })
            .collect();

        if filtered.len() < before {
            info!(
                kept = filtered.len(),
                dropped = before - filtered.len(),
                "confidence filtering applied"
            );
        }

        filtered
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntityType, RelationshipType, ScoringMethod};

    fn edge_with_confidences(confidence_a: f64, confidence_b: f64) -> CandidateEdge {
        CandidateEdge {
            source: "A".to_string(),
            target: "B".to_string(),
            score: 0.8,
            pmi: None,
            npmi: None,
            is_rare_entity: true,
            scoring_method: ScoringMethod::ProximityOnly,
            confidence_a,
            confidence_b,
            confidence_avg: (confidence_a + confidence_b) / 2.0,
            strength: 0.0,
            proximity_weight: 3.0,
            raw_count: 3,
            min_distance: 0,
            avg_distance: 0.0,
            relationship_type: RelationshipType::SameSentence,
            relationship_description: String::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Combinators
    // -------------------------------------------------------------------------

    #[test]
    fn test_multiply() {
        assert!((ConfidenceMode::Multiply.combine(0.8, 0.5) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_harmonic() {
        let h = ConfidenceMode::Harmonic.combine(0.8, 0.4);
        // 2 / (1/0.8 + 1/0.4) = 0.5333...
        assert!((h - 2.0 / (1.25 + 2.5)).abs() < 1e-9);
    }

    #[test]
    fn test_harmonic_zero_side() {
        assert_eq!(ConfidenceMode::Harmonic.combine(0.0, 0.9), 0.0);
        assert_eq!(ConfidenceMode::Harmonic.combine(0.9, 0.0), 0.0);
    }

    #[test]
    fn test_minimum() {
        assert!((ConfidenceMode::Minimum.combine(0.8, 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_average() {
        assert!((ConfidenceMode::Average.combine(0.8, 0.4) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_all_modes_identity_at_full_confidence() {
        for mode in [
            ConfidenceMode::Multiply,
            ConfidenceMode::Harmonic,
            ConfidenceMode::Minimum,
            ConfidenceMode::Average,
        ] {
            assert!((mode.combine(1.0, 1.0) - 1.0).abs() < 1e-9, "{mode:?}");
        }
    }

    #[test]
    fn test_weight_scales_score() {
        let weighter = ConfidenceWeighter::new(ConfidenceMode::Minimum);
        assert!((weighter.weight(0.6, 0.5, 0.9) - 0.3).abs() < 1e-9);
    }

    // -------------------------------------------------------------------------
    // Wikidata boost
    // -------------------------------------------------------------------------

    #[test]
    fn test_boost_wikidata() {
        let mut facts = vec![
            Fact::new(1, "Phil Scott", EntityType::Person, 0.8).with_wikidata("Q885102"),
            Fact::new(1, "Someone Else", EntityType::Person, 0.8),
        ];

        let boosted = ConfidenceWeighter::boost_wikidata(&mut facts, 0.1, 1.0);

        assert_eq!(boosted, 1);
        assert!((facts[0].confidence - 0.9).abs() < 1e-9);
        assert!(facts[0].confidence_boosted);
        assert!((facts[0].confidence_boost - 0.1).abs() < 1e-9);
        assert!((facts[1].confidence - 0.8).abs() < 1e-9);
        assert!(!facts[1].confidence_boosted);
    }

    #[test]
    fn test_boost_clamped_at_max() {
        let mut facts =
            vec![Fact::new(1, "Phil Scott", EntityType::Person, 0.95).with_wikidata("Q885102")];

        ConfidenceWeighter::boost_wikidata(&mut facts, 0.1, 1.0);

        assert!((facts[0].confidence - 1.0).abs() < 1e-9);
        assert!((facts[0].confidence_boost - 0.05).abs() < 1e-9, "delta records the clamp");
    }

    #[test]
    fn test_boost_noop_at_ceiling() {
        let mut facts =
            vec![Fact::new(1, "Phil Scott", EntityType::Person, 1.0).with_wikidata("Q885102")];

        let boosted = ConfidenceWeighter::boost_wikidata(&mut facts, 0.1, 1.0);

        assert_eq!(boosted, 0);
        assert!(!facts[0].confidence_boosted);
    }

    // -------------------------------------------------------------------------
    // Confidence filtering
    // -------------------------------------------------------------------------

    #[test]
    fn test_filter_by_entity_confidence() {
        let edges = vec![
            edge_with_confidences(0.9, 0.9),
            edge_with_confidences(0.5, 0.9),
        ];

        let filtered = ConfidenceWeighter::filter_by_confidence(edges, 0.6, 0.5);

        assert_eq!(filtered.len(), 1);
        assert!((filtered[0].confidence_a - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_filter_by_relationship_confidence() {
        let edges = vec![edge_with_confidences(0.6, 0.6)];

        let kept = ConfidenceWeighter::filter_by_confidence(edges.clone(), 0.6, 0.5);
        assert_eq!(kept.len(), 1);

        let dropped = ConfidenceWeighter::filter_by_confidence(edges, 0.6, 0.7);
        assert!(dropped.is_empty());
    }
}
