//! Bounded polling with an optional one-shot recovery action.
//!
//! The UI this flow drives changes state asynchronously: controls appear
//! late, scripts attach handlers after paint, other users mutate shared
//! state. Every bounded synchronization point goes through these two
//! functions so the retry/recovery semantics live in one place.

use std::future::Future;
use std::time::Duration;

use crate::FlowError;

/// Result of a bounded polling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Whether the condition was observed before the attempts ran out.
    pub success: bool,
    /// Number of check invocations consumed.
    pub attempts: u32,
}

/// Repeatedly invoke `check` until it reports true or `max_attempts` runs
/// out, sleeping `interval` between attempts.
///
/// A `check` error is treated as a non-match: logged, then polling
/// continues. Returns immediately on the first true result.
pub async fn poll_until<C, F>(mut check: C, max_attempts: u32, interval: Duration) -> PollOutcome
where
    C: FnMut() -> F,
    F: Future<Output = Result<bool, FlowError>>,
{
    for attempt in 1..=max_attempts {
        match check().await {
            Ok(true) => {
                return PollOutcome {
                    success: true,
                    attempts: attempt,
                }
            }
            Ok(false) => {
                tracing::trace!(attempt, max_attempts, "condition not met yet");
            }
            Err(err) => {
                tracing::debug!(attempt, error = %err, "poll check failed; treating as miss");
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }
    PollOutcome {
        success: false,
        attempts: max_attempts,
    }
}

/// Like [`poll_until`], with a recovery action performed at most once per
/// invocation: at the halfway attempt if the condition is still unresolved,
/// or the first time `check` errors -- whichever comes first.
///
/// The date-selection stage passes a full page reload here; once it has
/// fired, polling resumes and recovery never repeats no matter how many
/// attempts remain.
pub async fn poll_until_with_recovery<C, CF, R, RF>(
    mut check: C,
    mut recover: R,
    max_attempts: u32,
    interval: Duration,
) -> PollOutcome
where
    C: FnMut() -> CF,
    CF: Future<Output = Result<bool, FlowError>>,
    R: FnMut() -> RF,
    RF: Future<Output = ()>,
{
    let mut recovered = false;
    let halfway = (max_attempts / 2).max(1);

    for attempt in 1..=max_attempts {
        match check().await {
            Ok(true) => {
                return PollOutcome {
                    success: true,
                    attempts: attempt,
                }
            }
            Ok(false) => {
                tracing::trace!(attempt, max_attempts, "condition not met yet");
            }
            Err(err) => {
                tracing::debug!(attempt, error = %err, "poll check failed; treating as miss");
                if !recovered {
                    recovered = true;
                    tracing::info!(attempt, "performing one-time recovery after check failure");
                    recover().await;
                }
            }
        }

        if attempt == halfway && !recovered {
            recovered = true;
            tracing::info!(attempt, "condition unresolved at halfway point, performing one-time recovery");
            recover().await;
        }

        if attempt < max_attempts {
            tokio::time::sleep(interval).await;
        }
    }

    PollOutcome {
        success: false,
        attempts: max_attempts,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const FAST: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_success_on_attempt_k_consumes_exactly_k_checks() {
        for k in [1u32, 3, 7] {
            let calls = Cell::new(0u32);
            let outcome = poll_until(
                || {
                    calls.set(calls.get() + 1);
                    let n = calls.get();
                    async move { Ok(n >= k) }
                },
                10,
                FAST,
            )
            .await;
            assert!(outcome.success);
            assert_eq!(outcome.attempts, k);
            assert_eq!(calls.get(), k);
        }
    }

    #[tokio::test]
    async fn test_always_false_consumes_exactly_max_attempts() {
        let calls = Cell::new(0u32);
        let outcome = poll_until(
            || {
                calls.set(calls.get() + 1);
                async { Ok(false) }
            },
            6,
            FAST,
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 6);
        assert_eq!(calls.get(), 6);
    }

    #[tokio::test]
    async fn test_check_errors_are_treated_as_misses() {
        let calls = Cell::new(0u32);
        let outcome = poll_until(
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(FlowError::UnexpectedValue {
                            detail: "transient".to_string(),
                        })
                    } else {
                        Ok(true)
                    }
                }
            },
            10,
            FAST,
        )
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_recovery_fires_exactly_once_when_exhausted() {
        let recoveries = Cell::new(0u32);
        let checks = Cell::new(0u32);
        let outcome = poll_until_with_recovery(
            || {
                checks.set(checks.get() + 1);
                async { Ok(false) }
            },
            || {
                recoveries.set(recoveries.get() + 1);
                async {}
            },
            8,
            FAST,
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(checks.get(), 8);
        assert_eq!(recoveries.get(), 1);
    }

    #[tokio::test]
    async fn test_no_recovery_before_halfway_success() {
        // Success on attempt 2 of 10: halfway (5) is never reached.
        let recoveries = Cell::new(0u32);
        let checks = Cell::new(0u32);
        let outcome = poll_until_with_recovery(
            || {
                checks.set(checks.get() + 1);
                let n = checks.get();
                async move { Ok(n >= 2) }
            },
            || {
                recoveries.set(recoveries.get() + 1);
                async {}
            },
            10,
            FAST,
        )
        .await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(recoveries.get(), 0);
    }

    #[tokio::test]
    async fn test_recovery_never_fires_twice_despite_errors_and_halfway() {
        // Errors trigger recovery early; the halfway point must not fire it
        // again.
        let recoveries = Cell::new(0u32);
        let outcome = poll_until_with_recovery(
            || async {
                Err(FlowError::UnexpectedValue {
                    detail: "boom".to_string(),
                })
            },
            || {
                recoveries.set(recoveries.get() + 1);
                async {}
            },
            10,
            FAST,
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(recoveries.get(), 1);
    }

    #[tokio::test]
    async fn test_success_after_recovery_still_counts_attempts() {
        // Condition flips to true only after recovery has run.
        let recovered = Cell::new(false);
        let checks = Cell::new(0u32);
        let outcome = poll_until_with_recovery(
            || {
                checks.set(checks.get() + 1);
                let ok = recovered.get();
                async move { Ok(ok) }
            },
            || {
                recovered.set(true);
                async {}
            },
            10,
            FAST,
        )
        .await;
        assert!(outcome.success);
        // Recovery fires at halfway (attempt 5); attempt 6 sees true.
        assert_eq!(outcome.attempts, 6);
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let outcome = poll_until(|| async { Ok(false) }, 1, FAST).await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 1);
    }
}
