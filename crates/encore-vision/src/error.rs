//! Error types for image preprocessing and recognition.

use thiserror::Error;

/// Errors that can occur while preprocessing or recognizing a challenge image.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode challenge image: {0}")]
    Decode(String),

    #[error("failed to encode processed image: {0}")]
    Encode(String),

    #[error("recognition backend `{backend}` failed: {detail}")]
    Backend { backend: String, detail: String },

    #[error("no scripted recognition result left")]
    Exhausted,
}
