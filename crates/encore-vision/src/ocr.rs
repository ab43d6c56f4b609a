//! Text recognition behind a swappable provider trait.
//!
//! The concrete backend shells out to the `tesseract` binary with an
//! uppercase-letter whitelist and single-line page segmentation. Keeping the
//! engine behind [`TextRecognizer`] lets the challenge solver run against a
//! scripted stub in tests and makes the backend replaceable without touching
//! flow code.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{VisionError, UPPERCASE_WHITELIST};

/// A text-recognition capability over an encoded (PNG) image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in `image_png`, returning the raw engine output
    /// (unfiltered; callers apply [`crate::extract_candidate`]).
    async fn recognize(&self, image_png: &[u8]) -> Result<String, VisionError>;
}

// ---------------------------------------------------------------------------
// Tesseract CLI backend
// ---------------------------------------------------------------------------

/// Recognizer that invokes the `tesseract` command-line binary.
pub struct TesseractBackend {
    binary: PathBuf,
    language: String,
    whitelist: String,
}

impl TesseractBackend {
    pub fn new(binary: PathBuf, language: impl Into<String>) -> Self {
        Self {
            binary,
            language: language.into(),
            whitelist: UPPERCASE_WHITELIST.to_string(),
        }
    }

    /// Override the character whitelist (defaults to uppercase A-Z).
    pub fn with_whitelist(mut self, whitelist: impl Into<String>) -> Self {
        self.whitelist = whitelist.into();
        self
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new(PathBuf::from("tesseract"), "eng")
    }
}

#[async_trait]
impl TextRecognizer for TesseractBackend {
    async fn recognize(&self, image_png: &[u8]) -> Result<String, VisionError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("challenge.png");
        tokio::fs::write(&input, image_png).await?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .args(["-l", &self.language])
            // Single text line: the challenge renders its code on one row.
            .args(["--psm", "7"])
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={}", self.whitelist))
            .output()
            .await
            .map_err(|e| VisionError::Backend {
                backend: self.binary.display().to_string(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(VisionError::Backend {
                backend: self.binary.display().to_string(),
                detail: format!(
                    "exit {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        tracing::debug!(raw = text.trim(), "recognition output");
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Scripted stub
// ---------------------------------------------------------------------------

/// Recognizer returning pre-queued results, for tests and dry runs.
///
/// Results are consumed in order; once the queue is empty every call
/// returns [`VisionError::Exhausted`].
pub struct QueuedRecognizer {
    results: Mutex<VecDeque<String>>,
}

impl QueuedRecognizer {
    pub fn new(results: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().map(Into::into).collect()),
        }
    }

    /// Number of scripted results not yet consumed.
    pub fn remaining(&self) -> usize {
        self.results.lock().map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TextRecognizer for QueuedRecognizer {
    async fn recognize(&self, _image_png: &[u8]) -> Result<String, VisionError> {
        let mut queue = self
            .results
            .lock()
            .map_err(|_| VisionError::Exhausted)?;
        queue.pop_front().ok_or(VisionError::Exhausted)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_recognizer_returns_in_order() {
        let recognizer = QueuedRecognizer::new(["AB", "ABCDEF123"]);
        assert_eq!(recognizer.remaining(), 2);

        assert_eq!(recognizer.recognize(&[]).await.unwrap(), "AB");
        assert_eq!(recognizer.recognize(&[]).await.unwrap(), "ABCDEF123");
        assert!(matches!(
            recognizer.recognize(&[]).await,
            Err(VisionError::Exhausted)
        ));
        assert_eq!(recognizer.remaining(), 0);
    }

    #[tokio::test]
    async fn test_missing_backend_binary_surfaces_as_backend_error() {
        let backend = TesseractBackend::new(PathBuf::from("/nonexistent/tesseract-bin"), "eng");
        let result = backend.recognize(&[0u8; 4]).await;
        assert!(matches!(result, Err(VisionError::Backend { .. })));
    }

    #[test]
    fn test_default_backend_uses_uppercase_whitelist() {
        let backend = TesseractBackend::default();
        assert_eq!(backend.whitelist, UPPERCASE_WHITELIST);
        assert_eq!(backend.language, "eng");
    }

    #[test]
    fn test_whitelist_override() {
        let backend = TesseractBackend::default().with_whitelist("ABC123");
        assert_eq!(backend.whitelist, "ABC123");
    }
}
