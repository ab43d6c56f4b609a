//! Seat selection under contention.
//!
//! Walks the seat shapes of the currently selected zone in document order.
//! Selection state is never cached: it is inferred from two live attribute
//! reads through a named predicate, re-checked after every click, because
//! other users are grabbing the same seats while we look at them. A click
//! that does not take effect is not an error -- someone else got there
//! first, or the shape was a spacer -- the walk just moves on.

use std::time::Duration;

use encore_types::SiteProfile;
use serde::Deserialize;

use crate::poll::poll_until;
use crate::script;
use crate::ui::{value_is_true, PageOps};
use crate::FlowError;

// ---------------------------------------------------------------------------
// Selection-state inference
// ---------------------------------------------------------------------------

/// The two live attributes selection state is read from.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeatAttributes {
    pub stroke_width: Option<String>,
    pub fill_opacity: Option<String>,
}

/// Named predicate deciding whether a shape's live attributes mean
/// "selected". Swappable without touching the walk itself.
pub trait SelectionProbe: Send + Sync {
    fn is_selected(&self, attrs: &SeatAttributes) -> bool;
}

/// Default detection heuristic: the diagram marks a held seat by setting
/// `stroke-width="2"` and `fill-opacity="0.5"` on its shape.
#[derive(Debug, Clone)]
pub struct StrokeFillProbe {
    pub stroke_width: String,
    pub fill_opacity: String,
}

impl Default for StrokeFillProbe {
    fn default() -> Self {
        Self {
            stroke_width: "2".to_string(),
            fill_opacity: "0.5".to_string(),
        }
    }
}

impl SelectionProbe for StrokeFillProbe {
    fn is_selected(&self, attrs: &SeatAttributes) -> bool {
        attrs.stroke_width.as_deref() == Some(self.stroke_width.as_str())
            && attrs.fill_opacity.as_deref() == Some(self.fill_opacity.as_str())
    }
}

// ---------------------------------------------------------------------------
// Seat selection walk
// ---------------------------------------------------------------------------

/// Tunables for the seat walk.
#[derive(Debug, Clone)]
pub struct SeatConfig {
    /// Pause between a click and the verification re-read.
    pub click_settle: Duration,
    /// How long to wait for the proceed control after a verified selection.
    pub proceed_wait: Duration,
    /// Poll interval for the proceed control.
    pub proceed_poll_interval: Duration,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            click_settle: Duration::from_millis(100),
            proceed_wait: Duration::from_secs(5),
            proceed_poll_interval: Duration::from_millis(250),
        }
    }
}

/// Attempts to hold one seat in the currently selected zone and advance.
pub struct SeatSelector<'a, U: PageOps, P: SelectionProbe + ?Sized> {
    page: &'a U,
    probe: &'a P,
    profile: &'a SiteProfile,
    config: SeatConfig,
}

impl<'a, U: PageOps, P: SelectionProbe + ?Sized> SeatSelector<'a, U, P> {
    pub fn new(page: &'a U, probe: &'a P, profile: &'a SiteProfile) -> Self {
        Self {
            page,
            probe,
            profile,
            config: SeatConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SeatConfig) -> Self {
        self.config = config;
        self
    }

    /// Walk the zone's shapes once.
    ///
    /// Returns `Ok(true)` when a seat was verifiably held and the proceed
    /// control clicked; `Ok(false)` when every shape was exhausted. The
    /// caller owns the retry-in-another-zone policy.
    pub async fn select_in_zone(&self) -> Result<bool, FlowError> {
        let frame_name = self.profile.content_frame_name.as_str();
        let Some(frame) = self.page.frame_by_name(frame_name).await? else {
            tracing::error!(frame = frame_name, "cannot find content frame");
            return Ok(false);
        };

        let shape_selector = self.profile.seat_shape_selector.as_str();
        let count_value = self
            .page
            .eval_in_frame(&frame, &script::seat_count(shape_selector))
            .await?;
        let count = count_value
            .as_u64()
            .ok_or_else(|| FlowError::UnexpectedValue {
                detail: format!("seat count returned {count_value}"),
            })?;
        tracing::info!(count, "scanning seat shapes");

        for index in 0..count {
            let Some(attrs) = self.read_attributes(&frame, index).await? else {
                // The shape vanished between the count and this read.
                continue;
            };
            if self.probe.is_selected(&attrs) {
                tracing::debug!(index, "shape already selected, skipping");
                continue;
            }

            match self
                .page
                .eval_in_frame(&frame, &script::seat_click(shape_selector, index))
                .await
            {
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(index, error = %err, "seat click failed, moving on");
                    continue;
                }
            }

            tokio::time::sleep(self.config.click_settle).await;

            let Some(attrs) = self.read_attributes(&frame, index).await? else {
                continue;
            };
            if !self.probe.is_selected(&attrs) {
                tracing::debug!(index, "click did not take effect, moving on");
                continue;
            }

            tracing::info!(index, "seat selection verified, waiting for proceed control");
            if !self.wait_and_click_proceed(&frame).await? {
                tracing::warn!(index, "proceed control never activated, moving on");
                continue;
            }

            return Ok(true);
        }

        tracing::warn!(count, "every shape exhausted without a verified selection");
        Ok(false)
    }

    /// Re-read the live selection attributes of one shape. `None` when the
    /// shape no longer exists.
    async fn read_attributes(
        &self,
        frame: &encore_browser::FrameHandle,
        index: u64,
    ) -> Result<Option<SeatAttributes>, FlowError> {
        let value = self
            .page
            .eval_in_frame(
                frame,
                &script::seat_attributes(&self.profile.seat_shape_selector, index),
            )
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let attrs =
            serde_json::from_value(value.clone()).map_err(|e| FlowError::UnexpectedValue {
                detail: format!("seat attributes: {e}"),
            })?;
        Ok(Some(attrs))
    }

    /// Wait for the proceed control's active-state marker, then click it.
    async fn wait_and_click_proceed(
        &self,
        frame: &encore_browser::FrameHandle,
    ) -> Result<bool, FlowError> {
        let active_expr = script::proceed_active(
            &self.profile.proceed_selector,
            &self.profile.proceed_active_class,
        );
        let attempts = (self.config.proceed_wait.as_millis()
            / self.config.proceed_poll_interval.as_millis().max(1))
        .max(1) as u32;

        let page = self.page;
        let outcome = poll_until(
            || {
                let expr = active_expr.clone();
                async move { Ok(value_is_true(&page.eval_in_frame(frame, &expr).await?)) }
            },
            attempts,
            self.config.proceed_poll_interval,
        )
        .await;

        if !outcome.success {
            return Ok(false);
        }

        let clicked = value_is_true(
            &self
                .page
                .eval_in_frame(frame, &script::element_click(&self.profile.proceed_selector))
                .await?,
        );
        if clicked {
            tracing::info!("seat selection completed");
        }
        Ok(clicked)
    }
}

// ---------------------------------------------------------------------------
// Fallback-zone choice
// ---------------------------------------------------------------------------

/// Uniform random draw from the fallback pool.
pub fn choose_fallback<'a, R: rand::Rng + ?Sized>(
    rng: &mut R,
    pool: &'a [String],
) -> Option<&'a str> {
    if pool.is_empty() {
        return None;
    }
    Some(pool[rng.random_range(0..pool.len())].as_str())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
