//! Errors raised while reading stack configuration and lookup context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stack config is not valid KDL: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("stack config is missing {0}")]
    MissingField(String),

    #[error("bad {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{0} is declared more than once")]
    Duplicate(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("context file error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
