//! Core record types shared across the relationship pipeline
//!
//! Every stage exchanges the fixed records defined here: facts coming in
//! from extraction, positioned mentions, candidate edges moving through
//! scoring and filtering, and the edge rows handed to storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Enumerations
// =============================================================================

/// Coarse entity type attached to every fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    Product,
    Event,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Organization => "ORGANIZATION",
            EntityType::Location => "LOCATION",
            EntityType::Date => "DATE",
            EntityType::Product => "PRODUCT",
            EntityType::Event => "EVENT",
            EntityType::Other => "OTHER",
        }
    }
}

/// Relationship type derived from the closest proximity observed
///
/// Same-sentence wins over adjacent, adjacent wins over near.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    SameSentence,
    AdjacentSentence,
    NearProximity,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::SameSentence => "same-sentence",
            RelationshipType::AdjacentSentence => "adjacent-sentence",
            RelationshipType::NearProximity => "near-proximity",
        }
    }

    /// All proximity-derived types, used when clearing stale edges
    pub fn all() -> [RelationshipType; 3] {
        [
            RelationshipType::SameSentence,
            RelationshipType::AdjacentSentence,
            RelationshipType::NearProximity,
        ]
    }
}

/// How a pair was scored: full PMI or the rare-entity fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoringMethod {
    Pmi,
    ProximityOnly,
}

impl ScoringMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringMethod::Pmi => "pmi",
            ScoringMethod::ProximityOnly => "proximity-only",
        }
    }
}

/// Processing state of an article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Duplicate,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        ProcessingStatus::Completed
    }
}

// =============================================================================
// Articles and facts
// =============================================================================

/// A news article as handed over by the collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ProcessingStatus,
}

impl Article {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            published_at: None,
            status: ProcessingStatus::Completed,
        }
    }
}

/// A single entity fact extracted from an article
///
/// Position fields are null until the position tracker has run; they are
/// either all set or all null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub article_id: i64,
    /// Surface form, e.g. "Mayor Mike Doenges"
    #[serde(rename = "entity")]
    pub form: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub wikidata_id: Option<String>,
    #[serde(default)]
    pub wikidata_description: Option<String>,
    #[serde(default)]
    pub event_description: Option<String>,
    #[serde(default)]
    pub sentence_index: Option<usize>,
    #[serde(default)]
    pub paragraph_index: Option<usize>,
    #[serde(default)]
    pub char_start: Option<usize>,
    #[serde(default)]
    pub char_end: Option<usize>,
    #[serde(default)]
    pub confidence_boosted: bool,
    #[serde(default)]
    pub confidence_boost: f64,
}

impl Fact {
    pub fn new(
        article_id: i64,
        form: impl Into<String>,
        entity_type: EntityType,
        confidence: f64,
    ) -> Self {
        Self {
            article_id,
            form: form.into(),
            entity_type,
            confidence,
            sources: Vec::new(),
            wikidata_id: None,
            wikidata_description: None,
            event_description: None,
            sentence_index: None,
            paragraph_index: None,
            char_start: None,
            char_end: None,
            confidence_boosted: false,
            confidence_boost: 0.0,
        }
    }

    /// Builder: attach a source model name
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Builder: attach a Wikidata identifier
    pub fn with_wikidata(mut self, id: impl Into<String>) -> Self {
        self.wikidata_id = Some(id.into());
        self
    }

    /// True when the four position fields are populated
    pub fn has_position(&self) -> bool {
        self.sentence_index.is_some()
            && self.paragraph_index.is_some()
            && self.char_start.is_some()
            && self.char_end.is_some()
    }
}

/// One occurrence of an entity's form within its article text
///
/// A fact carries its first occurrence inline; the full mention list is
/// what the proximity matrix consumes, so an entity mentioned in several
/// sentences co-occurs from each of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub form: String,
    pub entity_type: EntityType,
    pub confidence: f64,
    pub sentence_index: usize,
    pub paragraph_index: usize,
    pub char_start: usize,
    pub char_end: usize,
}

// =============================================================================
// Edges
// =============================================================================

/// Candidate edge flowing through scoring, weighting, and filtering
///
/// The thresholder filters candidates but never rewrites them: every field
/// set upstream survives on the edges it keeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEdge {
    pub source: String,
    pub target: String,
    /// Normalized score used by the thresholder: NPMI when present,
    /// otherwise `min(1, pmi_score / 10)`
    pub score: f64,
    pub pmi: Option<f64>,
    pub npmi: Option<f64>,
    pub is_rare_entity: bool,
    pub scoring_method: ScoringMethod,
    pub confidence_a: f64,
    pub confidence_b: f64,
    pub confidence_avg: f64,
    /// Confidence-adjusted strength (score x combined confidence)
    pub strength: f64,
    pub proximity_weight: f64,
    pub raw_count: u64,
    pub min_distance: usize,
    pub avg_distance: f64,
    pub relationship_type: RelationshipType,
    pub relationship_description: String,
}

/// Persisted edge row, one per (article, pair, relationship type)
///
/// `entity_a < entity_b` lexicographically; the four-field key is the
/// upsert key at the storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub article_id: i64,
    pub entity_a: String,
    pub entity_b: String,
    pub relationship_type: RelationshipType,
    pub relationship_description: String,
    pub confidence: f64,
    pub pmi: Option<f64>,
    pub npmi: Option<f64>,
    pub raw_cooccurrence_count: u64,
    pub proximity_weight: f64,
    pub min_sentence_distance: usize,
    pub avg_sentence_distance: f64,
}

impl EdgeRecord {
    /// Unique storage key
    pub fn key(&self) -> (i64, String, String, String) {
        (
            self.article_id,
            self.entity_a.clone(),
            self.entity_b.clone(),
            self.relationship_type.as_str().to_string(),
        )
    }
}

// =============================================================================
// Graph boundary records
// =============================================================================

/// Node handed to community detection, centrality, and layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default = "default_node_weight")]
    pub weight: f64,
}

fn default_node_weight() -> f64 {
    1.0
}

impl GraphNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type: node_type.into(),
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Edge handed to community detection, centrality, and layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub npmi: Option<f64>,
    #[serde(default)]
    pub proximity_weight: Option<f64>,
}

impl GraphEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            strength: None,
            npmi: None,
            proximity_weight: None,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Numeric weight under the shared policy:
    /// strength, then NPMI clamped to >= 0, then proximity weight / 10,
    /// then 1.0.
    pub fn weight(&self) -> f64 {
        if let Some(s) = self.strength {
            if s > 0.0 {
                return s;
            }
        }
        if let Some(n) = self.npmi {
            return n.max(0.0);
        }
        if let Some(p) = self.proximity_weight {
            if p > 0.0 {
                return p / 10.0;
            }
        }
        1.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_wire_names() {
        let json = serde_json::to_string(&EntityType::Person).unwrap();
        assert_eq!(json, "\"PERSON\"");

        let parsed: EntityType = serde_json::from_str("\"ORGANIZATION\"").unwrap();
        assert_eq!(parsed, EntityType::Organization);
    }

    #[test]
    fn test_relationship_type_wire_names() {
        assert_eq!(RelationshipType::SameSentence.as_str(), "same-sentence");

        let json = serde_json::to_string(&RelationshipType::AdjacentSentence).unwrap();
        assert_eq!(json, "\"adjacent-sentence\"");
    }

    #[test]
    fn test_scoring_method_wire_names() {
        let json = serde_json::to_string(&ScoringMethod::ProximityOnly).unwrap();
        assert_eq!(json, "\"proximity-only\"");
    }

    #[test]
    fn test_fact_position_all_or_nothing() {
        let mut fact = Fact::new(1, "Phil Scott", EntityType::Person, 0.95);
        assert!(!fact.has_position());

        fact.sentence_index = Some(0);
        assert!(!fact.has_position(), "partial position is not a position");

        fact.paragraph_index = Some(0);
        fact.char_start = Some(0);
        fact.char_end = Some(10);
        assert!(fact.has_position());
    }

    #[test]
    fn test_graph_edge_weight_policy() {
        let mut edge = GraphEdge::new("a", "b");
        assert_eq!(edge.weight(), 1.0, "bare edge defaults to 1.0");

        edge.proximity_weight = Some(5.0);
        assert!((edge.weight() - 0.5).abs() < 1e-12);

        edge.npmi = Some(-0.4);
        assert_eq!(edge.weight(), 0.0, "negative NPMI clamps to zero");

        edge.npmi = Some(0.7);
        assert!((edge.weight() - 0.7).abs() < 1e-12);

        edge.strength = Some(0.9);
        assert!((edge.weight() - 0.9).abs() < 1e-12, "strength wins");
    }

    #[test]
    fn test_fact_deserializes_collaborator_shape() {
        let json = r#"{
            "article_id": 42,
            "entity": "Phil Scott",
            "type": "PERSON",
            "confidence": 0.95,
            "sources": ["claude"],
            "wikidata_id": "Q885102"
        }"#;

        let fact: Fact = serde_json::from_str(json).unwrap();
        assert_eq!(fact.form, "Phil Scott");
        assert_eq!(fact.entity_type, EntityType::Person);
        assert!(fact.sentence_index.is_none());
        assert_eq!(fact.wikidata_id.as_deref(), Some("Q885102"));
    }
}
