//! Post-mortem artifact sink.
//!
//! A side channel, never consumed downstream: per-attempt challenge
//! captures, a full-page screenshot and a markup dump of the popup are
//! written for human inspection after a run. Write failures are logged by
//! callers and never fail a stage.

use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::challenge::ChallengeAttempt;

/// Writes debug artifacts into one directory.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    dir: PathBuf,
}

impl ArtifactSink {
    /// Create the sink, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one challenge attempt's processed capture.
    pub fn record_challenge(&self, attempt: &ChallengeAttempt) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("challenge_{:02}.png", attempt.ordinal));
        std::fs::write(&path, &attempt.image)?;
        tracing::debug!(path = %path.display(), "challenge capture written");
        Ok(path)
    }

    /// Persist a full-page screenshot of the popup.
    pub fn record_page_screenshot(&self, png: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("popup_{}.png", timestamp()));
        std::fs::write(&path, png)?;
        tracing::debug!(path = %path.display(), "page screenshot written");
        Ok(path)
    }

    /// Persist the popup's markup.
    pub fn record_markup(&self, html: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(format!("popup_{}.html", timestamp()));
        std::fs::write(&path, html)?;
        tracing::debug!(path = %path.display(), "markup dump written");
        Ok(path)
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%dT%H%M%S").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_fixture() -> ChallengeAttempt {
        ChallengeAttempt {
            ordinal: 2,
            image: vec![0x89, 0x50, 0x4E, 0x47],
            raw_text: "ABCDEF\n".to_string(),
            candidate: "ABCDEF".to_string(),
            accepted: true,
        }
    }

    #[test]
    fn test_sink_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("artifacts").join("run1");
        let sink = ArtifactSink::new(&dir).unwrap();
        assert!(sink.dir().is_dir());
    }

    #[test]
    fn test_challenge_captures_are_named_by_ordinal() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(tmp.path()).unwrap();

        let path = sink.record_challenge(&attempt_fixture()).unwrap();
        assert_eq!(path.file_name().unwrap(), "challenge_02.png");
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_page_dumps_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(tmp.path()).unwrap();

        let png = sink.record_page_screenshot(&[1, 2, 3]).unwrap();
        assert!(png.extension().is_some_and(|e| e == "png"));

        let html = sink.record_markup("<html></html>").unwrap();
        assert_eq!(std::fs::read_to_string(&html).unwrap(), "<html></html>");
    }
}
