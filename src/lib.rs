//! Signalgraph: entity relationship intelligence core
//!
//! Turns positioned entity annotations over a news corpus into a curated,
//! scored, laid-out relationship graph.
//!
//! # Architecture
//!
//! ## Pipeline stages (per article)
//! - `normalizer.rs` - canonical entity forms and fact deduplication
//! - `position.rs` - sentence segmentation + mention offsets (Aho-Corasick)
//! - `proximity.rs` - windowed, proximity-weighted co-occurrence matrices
//! - `pmi.rs` - hybrid PMI/NPMI scoring with a rare-entity fallback
//! - `thresholder.rs` - size-adaptive three-stage edge filtering
//! - `confidence.rs` - confidence combinators and Wikidata boosting
//! - `generator.rs` - orchestration and the edge storage boundary
//!
//! ## Graph analytics (per corpus or article network)
//! - `graph/` - interned petgraph wrapper shared by the analytics
//! - `graph/community.rs` - seeded Louvain communities, colors, super-nodes
//! - `graph/centrality.rs` - PageRank, betweenness, degree, eigenvector
//! - `graph/layout.rs` - Fruchterman-Reingold layout with a stable cache
//!
//! # Usage
//! ```
//! use signalgraph::generator::RelationshipGenerator;
//! use signalgraph::types::{Article, EntityType, Fact};
//!
//! let generator = RelationshipGenerator::default();
//! let article = Article::new(1, "Phil Scott met Mike Doenges in Montpelier.");
//! let facts = vec![
//!     Fact::new(1, "Phil Scott", EntityType::Person, 0.95),
//!     Fact::new(1, "Mike Doenges", EntityType::Person, 0.9),
//!     Fact::new(1, "Montpelier", EntityType::Location, 0.92),
//! ];
//!
//! let edges = generator.generate_for_article(&article, facts).unwrap();
//! for edge in &edges {
//!     assert!(edge.entity_a < edge.entity_b);
//! }
//! ```

pub mod config;
pub mod confidence;
pub mod error;
pub mod generator;
pub mod graph;
pub mod normalizer;
pub mod pmi;
pub mod position;
pub mod proximity;
pub mod thresholder;
pub mod types;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use generator::{BatchReport, Corpus, EdgeStore, MemoryEdgeStore, RelationshipGenerator};
pub use types::{
    Article, CandidateEdge, EdgeRecord, EntityType, Fact, GraphEdge, GraphNode, Mention,
    RelationshipType, ScoringMethod,
};
