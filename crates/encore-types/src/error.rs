//! Error type for configuration and cookie-jar handling.

use thiserror::Error;

/// Errors raised while loading or validating configuration and cookie jars.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
