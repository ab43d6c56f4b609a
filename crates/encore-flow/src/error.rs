//! Error type for the reservation flow.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by flow components.
///
/// Components distinguish a *miss* (returned as `Ok(false)`, the caller
/// decides how to retry) from a structural or driver failure (returned as
/// `Err`, the stage is over). The orchestrator converts both into its stop
/// signal at the stage boundary.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("browser driver error: {0}")]
    Driver(#[from] encore_browser::BrowserError),

    #[error("recognition error: {0}")]
    Vision(#[from] encore_vision::VisionError),

    #[error("required element `{selector}` not found")]
    ElementMissing { selector: String },

    #[error("popup window did not appear within {elapsed:?}")]
    PopupTimeout { elapsed: Duration },

    #[error("evaluation returned an unexpected shape: {detail}")]
    UnexpectedValue { detail: String },
}
