//! The session orchestrator.
//!
//! Sequences the whole reservation: navigate, filter resources, pick the
//! date and time slot, trigger the page's reservation bootstrap, wait for
//! the popup, solve the challenge, expand and select a zone, contend for a
//! seat (retrying across fallback zones), and advance the payment step.
//!
//! Failure handling is all-or-nothing: every stage's errors are caught at
//! its boundary, logged, and turned into a stop signal; the browser is
//! released on the way out whatever happened. There is no partial-state
//! resumption.

use std::time::Duration;

use encore_browser::{DialogPolicy, ResourceKind};
use encore_types::{CookieRecord, SessionConfig};
use encore_vision::TextRecognizer;
use tokio::time::Instant;
use uuid::Uuid;

use crate::artifacts::ArtifactSink;
use crate::challenge::ChallengeSolver;
use crate::payment::PaymentAdvancer;
use crate::poll::{poll_until, poll_until_with_recovery};
use crate::popup::PopupLocator;
use crate::script;
use crate::seats::{choose_fallback, SeatSelector, StrokeFillProbe};
use crate::ui::{value_is_true, PageOps, SessionBrowser};
use crate::zones::{ZoneExpander, ZoneSelector};

// ---------------------------------------------------------------------------
// Timing constants
// ---------------------------------------------------------------------------

const DATE_POLL_ATTEMPTS: u32 = 30;
const DATE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RELOAD_SETTLE: Duration = Duration::from_millis(500);
const SLOT_POLL_ATTEMPTS: u32 = 10;
const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const SLOT_SETTLE: Duration = Duration::from_millis(300);
const BOOTSTRAP_POLL_ATTEMPTS: u32 = 10;
const BOOTSTRAP_POLL_INTERVAL: Duration = Duration::from_millis(500);
const POPUP_PROBE_INTERVAL: Duration = Duration::from_secs(1);
const ZONE_RETRY_PAUSE: Duration = Duration::from_millis(100);
const STEP_TRANSITION_SETTLE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one reservation session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub success: bool,
    /// Name of the stage that stopped the session, when it failed.
    pub failed_stage: Option<&'static str>,
}

/// A stage failure on its way to the report.
struct StageFailure {
    stage: &'static str,
    detail: String,
}

fn fail(stage: &'static str) -> impl FnOnce(crate::FlowError) -> StageFailure {
    move |err| StageFailure {
        stage,
        detail: err.to_string(),
    }
}

fn ensure(ok: bool, stage: &'static str) -> Result<(), StageFailure> {
    if ok {
        Ok(())
    } else {
        Err(StageFailure {
            stage,
            detail: "stage reported failure".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ReservationSession
// ---------------------------------------------------------------------------

/// Drives one scripted reservation against a browser.
pub struct ReservationSession<'a, B: SessionBrowser> {
    browser: &'a B,
    config: &'a SessionConfig,
}

impl<'a, B: SessionBrowser> ReservationSession<'a, B> {
    pub fn new(browser: &'a B, config: &'a SessionConfig) -> Self {
        Self { browser, config }
    }

    /// Run the session to completion or first unrecoverable failure. The
    /// browser is always released before returning; no error escapes as an
    /// `Err`.
    pub async fn run<R: TextRecognizer + ?Sized>(
        &self,
        recognizer: &R,
        cookies: &[CookieRecord],
        artifacts: Option<&ArtifactSink>,
    ) -> SessionReport {
        let session_id = Uuid::new_v4();
        tracing::info!(
            %session_id,
            date = %self.config.target_date,
            product = %self.config.product_id,
            "starting reservation session"
        );

        let result = self.drive(recognizer, cookies, artifacts).await;
        self.browser.close().await;

        match result {
            Ok(()) => {
                tracing::info!(%session_id, "reservation session completed");
                SessionReport {
                    session_id,
                    success: true,
                    failed_stage: None,
                }
            }
            Err(failure) => {
                tracing::error!(
                    %session_id,
                    stage = failure.stage,
                    detail = %failure.detail,
                    "reservation session aborted"
                );
                SessionReport {
                    session_id,
                    success: false,
                    failed_stage: Some(failure.stage),
                }
            }
        }
    }

    async fn drive<R: TextRecognizer + ?Sized>(
        &self,
        recognizer: &R,
        cookies: &[CookieRecord],
        artifacts: Option<&ArtifactSink>,
    ) -> Result<(), StageFailure> {
        let profile = &self.config.site;

        let page = self.browser.attach_initial().await.map_err(fail("attach"))?;
        page.set_cookies(cookies).await.map_err(fail("cookies"))?;

        // Initial navigation is retried exactly once, then propagated.
        if let Err(first) = page.navigate(&self.config.target_url).await {
            tracing::warn!(error = %first, "initial navigation failed, retrying once");
            page.navigate(&self.config.target_url)
                .await
                .map_err(fail("navigate"))?;
        }
        tracing::info!(url = %self.config.target_url, "performance page loaded");

        // Resource filtering starts after the first load so the page's own
        // assets are already in place.
        page.block_resource_types(&[
            ResourceKind::Image,
            ResourceKind::Stylesheet,
            ResourceKind::Font,
        ])
        .await
        .map_err(fail("resource-filter"))?;

        // -- Date selection ------------------------------------------------
        let date_expr = script::date_click(&profile.date_item_selector, &self.config.target_date);
        let page_ref = &page;
        let outcome = poll_until_with_recovery(
            || {
                let expr = date_expr.clone();
                async move { Ok(value_is_true(&page_ref.evaluate(&expr).await?)) }
            },
            || async move {
                if let Err(err) = page_ref.reload().await {
                    tracing::warn!(error = %err, "recovery reload failed");
                }
                tokio::time::sleep(RELOAD_SETTLE).await;
            },
            DATE_POLL_ATTEMPTS,
            DATE_POLL_INTERVAL,
        )
        .await;
        ensure(outcome.success, "date-selection")?;
        tracing::info!(
            attempts = outcome.attempts,
            date = %self.config.target_date,
            "date control clicked"
        );

        // -- Time-slot selection --------------------------------------------
        let slot_presence = script::element_presence(&profile.time_slot_selector);
        let outcome = poll_until(
            || {
                let expr = slot_presence.clone();
                async move { Ok(value_is_true(&page_ref.evaluate(&expr).await?)) }
            },
            SLOT_POLL_ATTEMPTS,
            SLOT_POLL_INTERVAL,
        )
        .await;
        ensure(outcome.success, "time-slot")?;
        page.evaluate(&script::activate_first_slot(
            &profile.time_slot_selector,
            &profile.active_slot_class,
        ))
        .await
        .map_err(fail("time-slot"))?;
        tokio::time::sleep(SLOT_SETTLE).await;

        // -- Reservation bootstrap ------------------------------------------
        let ready_expr = script::bootstrap_ready(&profile.reservation_service_object);
        let outcome = poll_until(
            || {
                let expr = ready_expr.clone();
                async move { Ok(value_is_true(&page_ref.evaluate(&expr).await?)) }
            },
            BOOTSTRAP_POLL_ATTEMPTS,
            BOOTSTRAP_POLL_INTERVAL,
        )
        .await;
        ensure(outcome.success, "reservation-init")?;
        page.evaluate(&script::bootstrap_invoke(
            &profile.reservation_service_object,
            &self.config.product_id,
            &profile.prod_type_code,
            &self.config.language,
        ))
        .await
        .map_err(fail("reservation-init"))?;
        tracing::info!("reservation bootstrap invoked");

        // -- Popup ----------------------------------------------------------
        let locator = PopupLocator::new(POPUP_PROBE_INTERVAL, self.config.popup_wait_limit());
        let browser = self.browser;
        let popup = locator
            .locate(|| {
                let fragment = profile.popup_url_fragment.clone();
                async move { browser.attach_matching(&fragment).await }
            })
            .await
            .map_err(fail("popup-wait"))?;
        popup.bring_to_front().await.map_err(fail("popup-wait"))?;

        // Post-mortem dumps are a side channel; their failures never stop
        // the session.
        if let Some(sink) = artifacts {
            match popup.screenshot().await {
                Ok(png) => {
                    if let Err(err) = sink.record_page_screenshot(&png) {
                        tracing::warn!(error = %err, "failed to write popup screenshot");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "failed to capture popup screenshot"),
            }
            match popup.html().await {
                Ok(markup) => {
                    if let Err(err) = sink.record_markup(&markup) {
                        tracing::warn!(error = %err, "failed to write popup markup");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "failed to read popup markup"),
            }
        }

        popup
            .auto_respond_dialogs(DialogPolicy::Accept)
            .await
            .map_err(fail("dialog-handler"))?;

        // -- Challenge ------------------------------------------------------
        let solver = ChallengeSolver::new(&popup, recognizer, profile);
        let solved = solver.solve(artifacts).await.map_err(fail("challenge"))?;
        ensure(solved, "challenge")?;

        // -- Zones ----------------------------------------------------------
        let expander = ZoneExpander::new(&popup, profile);
        let expanded = expander.expand().await.map_err(fail("zone-expansion"))?;
        ensure(expanded, "zone-expansion")?;

        let selector = ZoneSelector::new(&popup, profile);
        let primary = &self.config.seat_keywords[0];
        let selected = selector.select(primary).await.map_err(fail("zone-selection"))?;
        ensure(selected, "zone-selection")?;

        // -- Seats, with outer retry across fallback zones ------------------
        let probe = StrokeFillProbe::default();
        let seats = SeatSelector::new(&popup, &probe, profile);
        let retry_limit = self.config.seat_retry_limit();
        let contention_started = Instant::now();

        loop {
            let held = seats
                .select_in_zone()
                .await
                .map_err(fail("seat-selection"))?;
            if held {
                break;
            }

            if let Some(deadline) = retry_limit.deadline() {
                if contention_started.elapsed() >= deadline {
                    return Err(StageFailure {
                        stage: "seat-selection",
                        detail: format!(
                            "contention budget exhausted after {:?}",
                            contention_started.elapsed()
                        ),
                    });
                }
            }

            // Draw the next zone uniformly from the fallback pool. The rng
            // is scoped so it never lives across an await point.
            let keyword = {
                let pool = self.config.fallback_zone_pool();
                let mut rng = rand::rng();
                choose_fallback(&mut rng, pool).map(str::to_string)
            }
            .ok_or_else(|| StageFailure {
                stage: "seat-selection",
                detail: "no fallback zones configured".to_string(),
            })?;

            tracing::warn!(zone = %keyword, "zone exhausted, retrying in a fallback zone");
            let selected = selector
                .select(&keyword)
                .await
                .map_err(fail("zone-selection"))?;
            ensure(selected, "zone-selection")?;

            tokio::time::sleep(ZONE_RETRY_PAUSE).await;
        }

        // -- Payment --------------------------------------------------------
        // Give the content frame time to swap to the payment step. The
        // seat stage's frame handle is stale now; the advancer resolves
        // its own.
        tokio::time::sleep(STEP_TRANSITION_SETTLE).await;
        let advancer = PaymentAdvancer::new(&popup, profile);
        let advanced = advancer.advance().await.map_err(fail("payment"))?;
        ensure(advanced, "payment")?;

        tracing::info!("payment step reached; manual completion takes over from here");
        Ok(())
    }
}
