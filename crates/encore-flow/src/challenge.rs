//! The image-challenge solving loop.
//!
//! Capture the challenge region, preprocess it, recognize the text, and
//! validate the filtered candidate: exactly six uppercase letters or the
//! attempt is thrown away and the challenge refreshed. Recognition is noisy
//! by nature, so everything inside one attempt is a soft failure; only a
//! missing challenge image (the popup is not the page we think it is) and
//! an exhausted retry budget are terminal.

use std::time::Duration;

use encore_types::SiteProfile;
use encore_vision::{extract_candidate, is_submittable, prepare_for_recognition, TextRecognizer};

use crate::artifacts::ArtifactSink;
use crate::poll::poll_until;
use crate::script;
use crate::ui::{value_is_true, PageOps};
use crate::FlowError;

/// Tunables for the challenge loop.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Recognition attempts before the solver gives up.
    pub max_attempts: u32,
    /// How long to wait for the challenge image to exist at all.
    pub image_wait: Duration,
    /// Poll interval while waiting for the image.
    pub image_poll_interval: Duration,
    /// Pause between typed characters; the page's input validation watches
    /// the cadence.
    pub type_delay: Duration,
    /// Settle time after triggering a challenge refresh.
    pub refresh_settle: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            image_wait: Duration::from_secs(10),
            image_poll_interval: Duration::from_millis(500),
            type_delay: Duration::from_millis(100),
            refresh_settle: Duration::from_secs(1),
        }
    }
}

/// One recognition attempt, recorded for the artifact sink.
#[derive(Debug, Clone)]
pub struct ChallengeAttempt {
    /// 1-based attempt number.
    pub ordinal: u32,
    /// The processed capture handed to the recognizer.
    pub image: Vec<u8>,
    /// Raw recognizer output.
    pub raw_text: String,
    /// Filtered candidate (first six uppercase letters).
    pub candidate: String,
    /// Whether the candidate was submittable.
    pub accepted: bool,
}

/// Solves the popup's image challenge.
pub struct ChallengeSolver<'a, U: PageOps, R: TextRecognizer + ?Sized> {
    page: &'a U,
    recognizer: &'a R,
    profile: &'a SiteProfile,
    config: ChallengeConfig,
}

impl<'a, U: PageOps, R: TextRecognizer + ?Sized> ChallengeSolver<'a, U, R> {
    pub fn new(page: &'a U, recognizer: &'a R, profile: &'a SiteProfile) -> Self {
        Self {
            page,
            recognizer,
            profile,
            config: ChallengeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ChallengeConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the challenge loop.
    ///
    /// Returns `Ok(true)` once a six-letter code was typed and submitted,
    /// `Ok(false)` when the retry budget ran out, and `Err` when the
    /// challenge image never appeared (structural failure for the session).
    pub async fn solve(&self, artifacts: Option<&ArtifactSink>) -> Result<bool, FlowError> {
        let image_selector = self.profile.captcha_image_selector.as_str();
        let presence = script::element_presence(image_selector);
        let page = self.page;

        let budget = (self.config.image_wait.as_millis()
            / self.config.image_poll_interval.as_millis().max(1))
        .max(1) as u32;
        let present = poll_until(
            || {
                let expr = presence.clone();
                async move { Ok(value_is_true(&page.evaluate(&expr).await?)) }
            },
            budget,
            self.config.image_poll_interval,
        )
        .await;

        if !present.success {
            tracing::error!(selector = image_selector, "challenge image never appeared");
            return Err(FlowError::ElementMissing {
                selector: image_selector.to_string(),
            });
        }

        for ordinal in 1..=self.config.max_attempts {
            tracing::info!(ordinal, max = self.config.max_attempts, "recognizing challenge");

            match self.attempt(ordinal).await {
                Ok(attempt) => {
                    if let Some(sink) = artifacts {
                        if let Err(err) = sink.record_challenge(&attempt) {
                            tracing::warn!(error = %err, "failed to write challenge capture");
                        }
                    }

                    if attempt.accepted {
                        self.page
                            .type_text(
                                &self.profile.captcha_input_selector,
                                &attempt.candidate,
                                self.config.type_delay,
                            )
                            .await?;
                        self.page
                            .click(&self.profile.captcha_submit_selector)
                            .await?;
                        tracing::info!(ordinal, code = %attempt.candidate, "challenge code submitted");
                        return Ok(true);
                    }

                    tracing::warn!(
                        ordinal,
                        candidate = %attempt.candidate,
                        len = attempt.candidate.len(),
                        "candidate rejected, refreshing challenge"
                    );
                }
                Err(err) => {
                    tracing::warn!(ordinal, error = %err, "challenge attempt failed");
                }
            }

            if ordinal < self.config.max_attempts {
                self.refresh().await;
            }
        }

        tracing::error!(
            attempts = self.config.max_attempts,
            "challenge retry budget exhausted"
        );
        Ok(false)
    }

    /// Capture, preprocess and recognize once.
    async fn attempt(&self, ordinal: u32) -> Result<ChallengeAttempt, FlowError> {
        let raw = self
            .page
            .element_screenshot(&self.profile.captcha_image_selector)
            .await?;
        let processed = prepare_for_recognition(&raw)?;
        let raw_text = self.recognizer.recognize(&processed).await?;

        let candidate = extract_candidate(&raw_text);
        let accepted = is_submittable(&candidate);
        tracing::debug!(ordinal, raw = raw_text.trim(), candidate = %candidate, accepted, "attempt recognized");

        Ok(ChallengeAttempt {
            ordinal,
            image: processed,
            raw_text,
            candidate,
            accepted,
        })
    }

    /// Trigger the challenge's own reload control if present, then settle.
    async fn refresh(&self) {
        let reload_selector = self.profile.captcha_reload_selector.as_str();
        match self
            .page
            .evaluate(&script::element_presence(reload_selector))
            .await
        {
            Ok(value) if value_is_true(&value) => {
                if let Err(err) = self.page.click(reload_selector).await {
                    tracing::debug!(error = %err, "challenge reload click failed");
                }
            }
            Ok(_) => {
                tracing::debug!(selector = reload_selector, "no reload control on this challenge");
            }
            Err(err) => {
                tracing::debug!(error = %err, "could not check for a reload control");
            }
        }
        tokio::time::sleep(self.config.refresh_settle).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{PageCall, ScriptedPage};
    use encore_vision::QueuedRecognizer;
    use std::io::Cursor;

    /// A real decodable PNG, since the solver preprocesses before OCR.
    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(24, 8, image::Rgb([120, 130, 140]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn profile() -> SiteProfile {
        SiteProfile::default()
    }

    fn fast_config() -> ChallengeConfig {
        ChallengeConfig {
            image_wait: Duration::from_millis(10),
            image_poll_interval: Duration::from_millis(1),
            refresh_settle: Duration::from_millis(1),
            ..ChallengeConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_six_letter_code_is_typed_and_submitted() {
        let page = ScriptedPage::builder()
            .eval("#captchaImg", true)
            .element_screenshot(png_bytes())
            .build();
        let recognizer = QueuedRecognizer::new(["ABCDEF123"]);
        let profile = profile();

        let solver =
            ChallengeSolver::new(&page, &recognizer, &profile).with_config(fast_config());
        let solved = solver.solve(None).await.unwrap();

        assert!(solved);
        assert_eq!(
            page.typed_entries(),
            vec![("#label-for-captcha".to_string(), "ABCDEF".to_string())]
        );
        assert_eq!(page.click_count("#btnComplete"), 1);
        // The typing cadence is part of the contract.
        assert!(page
            .calls()
            .iter()
            .any(|c| matches!(c, PageCall::Type { delay_ms: 100, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_candidate_refreshes_and_retries() {
        let page = ScriptedPage::builder()
            .eval("#captchaImg", true)
            .eval("#btnReload", true)
            .element_screenshot(png_bytes())
            .build();
        // First read is too short, second resolves.
        let recognizer = QueuedRecognizer::new(["AB12", "KQWZXY"]);
        let profile = profile();

        let solver =
            ChallengeSolver::new(&page, &recognizer, &profile).with_config(fast_config());
        let solved = solver.solve(None).await.unwrap();

        assert!(solved);
        assert_eq!(page.click_count("#btnReload"), 1);
        assert_eq!(
            page.typed_entries(),
            vec![("#label-for-captcha".to_string(), "KQWZXY".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_reports_failure_not_error() {
        let page = ScriptedPage::builder()
            .eval("#captchaImg", true)
            .eval("#btnReload", true)
            .element_screenshot(png_bytes())
            .build();
        let recognizer = QueuedRecognizer::new(["A", "B", "C"]);
        let profile = profile();

        let solver =
            ChallengeSolver::new(&page, &recognizer, &profile).with_config(fast_config());
        let solved = solver.solve(None).await.unwrap();

        assert!(!solved);
        // Nothing was ever typed or submitted.
        assert!(page.typed_entries().is_empty());
        assert_eq!(page.click_count("#btnComplete"), 0);
        // One capture per attempt.
        let captures = page
            .calls()
            .iter()
            .filter(|c| matches!(c, PageCall::ElementScreenshot(_)))
            .count();
        assert_eq!(captures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_image_is_terminal() {
        let page = ScriptedPage::builder().eval("#captchaImg", false).build();
        let recognizer = QueuedRecognizer::new(["ABCDEF"]);
        let profile = profile();

        let solver =
            ChallengeSolver::new(&page, &recognizer, &profile).with_config(fast_config());
        let result = solver.solve(None).await;

        assert!(matches!(result, Err(FlowError::ElementMissing { .. })));
        // The solver never reached capture.
        assert!(!page
            .calls()
            .iter()
            .any(|c| matches!(c, PageCall::ElementScreenshot(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_recorded_as_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(tmp.path()).unwrap();

        let page = ScriptedPage::builder()
            .eval("#captchaImg", true)
            .element_screenshot(png_bytes())
            .build();
        let recognizer = QueuedRecognizer::new(["ABCDEF123"]);
        let profile = profile();

        let solver =
            ChallengeSolver::new(&page, &recognizer, &profile).with_config(fast_config());
        assert!(solver.solve(Some(&sink)).await.unwrap());

        assert!(tmp.path().join("challenge_01.png").is_file());
    }
}
