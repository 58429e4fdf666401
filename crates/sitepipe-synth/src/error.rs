//! Synthesis errors.

use sitepipe_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Core(#[from] sitepipe_core::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("asset '{path}': {message}")]
    Asset { path: PathBuf, message: String },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SynthResult<T> = std::result::Result<T, SynthError>;
