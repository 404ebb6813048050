//! Error type for the relationship core
//!
//! The numeric stages are pure compute and never fail; errors only arise
//! at the boundaries (mention automaton construction, edge storage,
//! corpus input parsing).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The Aho-Corasick automaton over entity forms could not be built
    #[error("failed to build mention automaton: {0}")]
    Automaton(#[from] aho_corasick::BuildError),

    /// The edge store rejected a write
    #[error("edge store failure: {0}")]
    Store(String),

    /// The corpus input was structurally invalid
    #[error("invalid corpus input: {0}")]
    InvalidInput(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
