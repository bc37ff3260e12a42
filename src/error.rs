//! Error types for pattern-forge
//!
//! The taxonomy mirrors how each failure is treated by the orchestrator:
//! match failures are downgraded to "no match", generation failures reach the
//! caller, persistence failures on the learning path are logged and dropped.

use thiserror::Error;

use crate::types::PatternKind;

/// Main error type for pattern operations
#[derive(Error, Debug)]
pub enum ForgeError {
    /// Candidate retrieval or scoring failed; never surfaced past the matcher
    #[error("Match error: {0}")]
    Match(String),

    /// The external generator failed (quota, rate limit, malformed response)
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Write-back or stats update failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Pattern id is absent from the kind's collection
    #[error("Pattern not found: {kind} {id}")]
    NotFound { kind: PatternKind, id: String },

    /// Request failed validation before reaching the store or generator
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Failure reported by a [`crate::generator::Generator`]. Opaque to the
/// orchestrator and never retried there.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    Request(String),

    #[error("Generator API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed generator response: {0}")]
    Malformed(String),
}

/// Result type alias for pattern operations
pub type Result<T> = std::result::Result<T, ForgeError>;

impl From<rusqlite::Error> for ForgeError {
    fn from(err: rusqlite::Error) -> Self {
        ForgeError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::Persistence(format!("serialization: {}", err))
    }
}
