//! Proximity-weighted co-occurrence matrices
//!
//! For one article, computes windowed co-occurrence data for every
//! unordered pair of distinct entities. Same-sentence pairs weigh 3.0,
//! adjacent sentences 2.0, anything else inside the window 1.0.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Mention, RelationshipType};

// =============================================================================
// Types
// =============================================================================

/// One counted co-occurrence between two mentions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooccurrenceHit {
    pub sentence_index: usize,
    pub distance: usize,
    pub weight: f64,
    pub confidence_a: f64,
    pub confidence_b: f64,
}

/// Accumulated co-occurrence statistics for an unordered entity pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooccurrenceData {
    pub entity_a: String,
    pub entity_b: String,
    pub total_weight: f64,
    pub occurrences: Vec<CooccurrenceHit>,
    pub min_distance: usize,
    pub max_distance: usize,
    pub avg_distance: f64,
    pub same_sentence_count: usize,
    pub adjacent_sentence_count: usize,
    pub near_proximity_count: usize,
}

impl CooccurrenceData {
    fn new(entity_a: String, entity_b: String) -> Self {
        Self {
            entity_a,
            entity_b,
            total_weight: 0.0,
            occurrences: Vec::new(),
            min_distance: usize::MAX,
            max_distance: 0,
            avg_distance: 0.0,
            same_sentence_count: 0,
            adjacent_sentence_count: 0,
            near_proximity_count: 0,
        }
    }

    /// Relationship type from the closest proximity observed
    pub fn relationship_type(&self) -> RelationshipType {
        if self.same_sentence_count > 0 {
            RelationshipType::SameSentence
        } else if self.adjacent_sentence_count > 0 {
            RelationshipType::AdjacentSentence
        } else {
            RelationshipType::NearProximity
        }
    }

    /// Human-readable relationship description
    pub fn describe(&self) -> String {
        match self.relationship_type() {
            RelationshipType::SameSentence => format!(
                "Appear together in same sentence ({} times, weight: {:.1})",
                self.same_sentence_count, self.total_weight
            ),
            RelationshipType::AdjacentSentence => format!(
                "Appear in adjacent sentences ({} times, weight: {:.1})",
                self.adjacent_sentence_count, self.total_weight
            ),
            RelationshipType::NearProximity => format!(
                "Appear nearby (avg distance: {:.1} sentences, weight: {:.1})",
                self.avg_distance, self.total_weight
            ),
        }
    }

    /// Mean confidence per pair side across recorded occurrences
    pub fn mean_confidences(&self) -> (f64, f64) {
        if self.occurrences.is_empty() {
            return (0.8, 0.8);
        }
        let n = self.occurrences.len() as f64;
        let sum_a: f64 = self.occurrences.iter().map(|o| o.confidence_a).sum();
        let sum_b: f64 = self.occurrences.iter().map(|o| o.confidence_b).sum();
        (sum_a / n, sum_b / n)
    }
}

/// Summary statistics over a co-occurrence matrix
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatrixStatistics {
    pub total_pairs: usize,
    pub same_sentence: usize,
    pub adjacent_sentence: usize,
    pub near_proximity: usize,
    pub avg_weight: f64,
    pub max_weight: f64,
    pub min_weight: f64,
}

pub type CooccurrenceMatrix = BTreeMap<(String, String), CooccurrenceData>;

// =============================================================================
// ProximityMatrix
// =============================================================================

/// Builds proximity-weighted co-occurrence matrices from positioned
/// mentions of a single article
pub struct ProximityMatrix {
    window_size: usize,
}

impl Default for ProximityMatrix {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ProximityMatrix {
    /// `window_size` 0 keeps only same-sentence pairs, 1 adds adjacent
    /// sentences, 2 (default) reaches two sentences out.
    pub fn new(window_size: usize) -> Self {
        Self { window_size }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Build the co-occurrence matrix for one article
    ///
    /// Each unordered mention pair is counted exactly once: sentence
    /// pairs are traversed with `i <= j`, and within a sentence every
    /// unordered pair appears a single time. Mentions of the same form
    /// never co-occur with themselves.
    pub fn build(&self, mentions: &[Mention]) -> CooccurrenceMatrix {
        let mut by_sentence: BTreeMap<usize, Vec<&Mention>> = BTreeMap::new();
        for mention in mentions {
            by_sentence.entry(mention.sentence_index).or_default().push(mention);
        }

        let mut matrix = CooccurrenceMatrix::new();

        for (&i, mentions_i) in &by_sentence {
            // Same sentence: each unordered pair once
            for (a_idx, a) in mentions_i.iter().enumerate() {
                for b in mentions_i.iter().skip(a_idx + 1) {
                    record_pair(&mut matrix, a, b, i, 0);
                }
            }

            // Later sentences inside the window
            for j in (i + 1)..=(i + self.window_size) {
                let Some(mentions_j) = by_sentence.get(&j) else {
                    continue;
                };
                let distance = j - i;
                for a in mentions_i {
                    for b in mentions_j {
                        record_pair(&mut matrix, a, b, i, distance);
                    }
                }
            }
        }

        // Finalize average distances
        for data in matrix.values_mut() {
            if !data.occurrences.is_empty() {
                let total: usize = data.occurrences.iter().map(|o| o.distance).sum();
                data.avg_distance = total as f64 / data.occurrences.len() as f64;
            }
        }

        debug!(
            pairs = matrix.len(),
            mentions = mentions.len(),
            "built co-occurrence matrix"
        );

        matrix
    }

    /// Distinct-sentence count per entity form, for rare-entity detection
    pub fn entity_frequencies(mentions: &[Mention]) -> HashMap<String, usize> {
        let mut sentences: HashMap<String, BTreeSet<usize>> = HashMap::new();
        for mention in mentions {
            sentences
                .entry(mention.form.clone())
                .or_default()
                .insert(mention.sentence_index);
        }
        sentences.into_iter().map(|(form, s)| (form, s.len())).collect()
    }

    /// Drop pairs below a total-weight floor
    pub fn filter_by_weight(matrix: CooccurrenceMatrix, min_weight: f64) -> CooccurrenceMatrix {
        matrix
            .into_iter()
            .filter(|(_, data)| data.total_weight >= min_weight)
            .collect()
    }

    /// Summary statistics, classifying pairs by their closest proximity
    pub fn statistics(matrix: &CooccurrenceMatrix) -> MatrixStatistics {
        if matrix.is_empty() {
            return MatrixStatistics::default();
        }

        let weights: Vec<f64> = matrix.values().map(|d| d.total_weight).collect();
        let same = matrix
            .values()
            .filter(|d| d.relationship_type() == RelationshipType::SameSentence)
            .count();
        let adjacent = matrix
            .values()
            .filter(|d| d.relationship_type() == RelationshipType::AdjacentSentence)
            .count();
        let near = matrix
            .values()
            .filter(|d| d.relationship_type() == RelationshipType::NearProximity)
            .count();

        MatrixStatistics {
            total_pairs: matrix.len(),
            same_sentence: same,
            adjacent_sentence: adjacent,
            near_proximity: near,
            avg_weight: weights.iter().sum::<f64>() / weights.len() as f64,
            max_weight: weights.iter().cloned().fold(f64::MIN, f64::max),
            min_weight: weights.iter().cloned().fold(f64::MAX, f64::min),
        }
    }
}

fn record_pair(
    matrix: &mut CooccurrenceMatrix,
    a: &Mention,
    b: &Mention,
    sentence_index: usize,
    distance: usize,
) {
    // Self-connections never count
    if a.form == b.form {
        return;
    }

    let weight = match distance {
        0 => 3.0,
        1 => 2.0,
        _ => 1.0,
    };

    // Canonicalize the pair lexicographically; confidences follow sides
    let (first, second, conf_a, conf_b) = if a.form <= b.form {
        (&a.form, &b.form, a.confidence, b.confidence)
    } else {
        (&b.form, &a.form, b.confidence, a.confidence)
    };

    let data = matrix
        .entry((first.clone(), second.clone()))
        .or_insert_with(|| CooccurrenceData::new(first.clone(), second.clone()));

    data.total_weight += weight;
    data.min_distance = data.min_distance.min(distance);
    data.max_distance = data.max_distance.max(distance);

    match distance {
        0 => data.same_sentence_count += 1,
        1 => data.adjacent_sentence_count += 1,
        _ => data.near_proximity_count += 1,
    }

    data.occurrences.push(CooccurrenceHit {
        sentence_index,
        distance,
        weight,
        confidence_a: conf_a,
        confidence_b: conf_b,
    });
}

// =============================================================================
// Tests
// =============================================================================
