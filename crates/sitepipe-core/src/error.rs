//! Error types for sitepipe.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unresolved lookup '{key}': {message}")]
    UnresolvedLookup { key: String, message: String },

    #[error("dangling reference: {from} -> {to}")]
    DanglingReference { from: String, to: String },

    #[error("cycle detected in resource graph: {0}")]
    CycleDetected(String),

    #[error("invalid stage placement: {0}")]
    Placement(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
