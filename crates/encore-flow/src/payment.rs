//! Advancing the payment step.
//!
//! After seat selection the content frame navigates to the payment step, so
//! the frame is re-resolved here -- never reused from the seat stage. The
//! "next" control can exist before it is visually interactive, which is why
//! the click is a synthetic dispatched event rather than a hit-tested one.

use std::time::Duration;

use encore_types::SiteProfile;

use crate::poll::poll_until;
use crate::script;
use crate::ui::{value_is_true, PageOps};
use crate::FlowError;

/// Tunables for the payment poll.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_millis(500),
        }
    }
}

/// Polls for and activates the payment step's "next" control.
pub struct PaymentAdvancer<'a, U: PageOps> {
    page: &'a U,
    profile: &'a SiteProfile,
    config: PaymentConfig,
}

impl<'a, U: PageOps> PaymentAdvancer<'a, U> {
    pub fn new(page: &'a U, profile: &'a SiteProfile) -> Self {
        Self {
            page,
            profile,
            config: PaymentConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PaymentConfig) -> Self {
        self.config = config;
        self
    }

    /// Poll for the "next" control and dispatch a synthetic click once it
    /// exists. Returns whether the click was dispatched.
    pub async fn advance(&self) -> Result<bool, FlowError> {
        let frame_name = self.profile.content_frame_name.as_str();
        let Some(frame) = self.page.frame_by_name(frame_name).await? else {
            tracing::error!(frame = frame_name, "cannot find content frame for payment step");
            return Ok(false);
        };

        let expr = script::payment_click(&self.profile.payment_next_selector);
        let page = self.page;
        let frame_ref = &frame;

        let outcome = poll_until(
            || {
                let expr = expr.clone();
                async move { Ok(value_is_true(&page.eval_in_frame(frame_ref, &expr).await?)) }
            },
            self.config.max_attempts,
            self.config.interval,
        )
        .await;

        if outcome.success {
            tracing::info!(attempts = outcome.attempts, "payment step advanced");
        } else {
            tracing::error!(
                attempts = outcome.attempts,
                "payment control never appeared"
            );
        }
        Ok(outcome.success)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
