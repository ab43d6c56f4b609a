//! Popup-window detection.
//!
//! The reservation page opens the seat-selection window out of band, after
//! its own scripts decide the session is eligible. There is no completion
//! signal to wait on, so the locator probes the browser's target list at a
//! fixed sub-interval until a window matching the configured URL fragment
//! exists, logging elapsed wall-clock time and attempt count on every miss.

use std::future::Future;
use std::time::Duration;

use encore_types::WaitLimit;
use tokio::time::Instant;

use crate::FlowError;

/// Locates a newly created window by URL substring.
#[derive(Debug, Clone)]
pub struct PopupLocator {
    /// Pause between probes.
    pub probe_interval: Duration,
    /// `Unbounded` preserves the keep-trying-forever behavior; a deadline
    /// makes the wait cancellable.
    pub limit: WaitLimit,
}

impl Default for PopupLocator {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(1),
            limit: WaitLimit::Unbounded,
        }
    }
}

impl PopupLocator {
    pub fn new(probe_interval: Duration, limit: WaitLimit) -> Self {
        Self {
            probe_interval,
            limit,
        }
    }

    /// Probe until the popup appears.
    ///
    /// `probe` returns `Ok(Some(handle))` once a window matching the URL
    /// fragment exists and has been attached. Probe errors are transient --
    /// target listing can race window creation -- and never abort the wait;
    /// only the deadline does.
    pub async fn locate<T, P, F>(&self, mut probe: P) -> Result<T, FlowError>
    where
        P: FnMut() -> F,
        F: Future<Output = Result<Option<T>, FlowError>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match probe().await {
                Ok(Some(found)) => {
                    tracing::info!(
                        attempt,
                        elapsed_secs = started.elapsed().as_secs(),
                        "popup window located"
                    );
                    return Ok(found);
                }
                Ok(None) => {
                    tracing::info!(
                        attempt,
                        elapsed_secs = started.elapsed().as_secs(),
                        "still waiting for popup window"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        attempt,
                        elapsed_secs = started.elapsed().as_secs(),
                        error = %err,
                        "popup probe failed; retrying"
                    );
                }
            }

            if let Some(deadline) = self.limit.deadline() {
                if started.elapsed() >= deadline {
                    let elapsed = started.elapsed();
                    tracing::error!(attempt, ?elapsed, "gave up waiting for popup window");
                    return Err(FlowError::PopupTimeout { elapsed });
                }
            }

            tokio::time::sleep(self.probe_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast_locator(limit: WaitLimit) -> PopupLocator {
        PopupLocator::new(Duration::from_millis(1), limit)
    }

    #[tokio::test]
    async fn test_returns_handle_once_probe_matches() {
        let probes = Cell::new(0u32);
        let locator = fast_locator(WaitLimit::Unbounded);

        let found = locator
            .locate(|| {
                probes.set(probes.get() + 1);
                let n = probes.get();
                async move {
                    if n >= 4 {
                        Ok(Some("popup-handle"))
                    } else {
                        Ok(None)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(found, "popup-handle");
        assert_eq!(probes.get(), 4);
    }

    #[tokio::test]
    async fn test_probe_errors_do_not_abort_the_wait() {
        let probes = Cell::new(0u32);
        let locator = fast_locator(WaitLimit::Unbounded);

        let found = locator
            .locate(|| {
                probes.set(probes.get() + 1);
                let n = probes.get();
                async move {
                    match n {
                        1 | 2 => Err(FlowError::UnexpectedValue {
                            detail: "listing raced window creation".to_string(),
                        }),
                        3 => Ok(None),
                        _ => Ok(Some(42)),
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(found, 42);
        assert_eq!(probes.get(), 4);
    }

    #[tokio::test]
    async fn test_deadline_cancels_the_wait() {
        let locator = fast_locator(WaitLimit::Deadline(Duration::from_millis(20)));

        let result: Result<(), FlowError> =
            locator.locate(|| async { Ok(None::<()>) }).await;

        match result {
            Err(FlowError::PopupTimeout { elapsed }) => {
                assert!(elapsed >= Duration::from_millis(20));
            }
            other => panic!("expected PopupTimeout, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deadline_does_not_preempt_a_match() {
        // A probe that matches on the first attempt wins even with a tiny
        // deadline.
        let locator = fast_locator(WaitLimit::Deadline(Duration::from_millis(1)));
        let found = locator.locate(|| async { Ok(Some(7)) }).await.unwrap();
        assert_eq!(found, 7);
    }
}
