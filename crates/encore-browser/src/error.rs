//! Error types for the encore-browser crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during browser operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No Chrome or Chromium binary could be located.
    #[error("no Chrome or Chromium binary found on this system")]
    NoChromeFound,

    /// The browser process could not be started or did not expose its
    /// DevTools endpoint in time.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed { reason: String },

    /// Failed to establish a WebSocket connection to a DevTools target.
    #[error("failed to connect to DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The DevTools HTTP endpoint (`/json/...`) returned an error.
    #[error("DevTools endpoint error: {0}")]
    Endpoint(#[from] reqwest::Error),

    /// A target exists but carries no WebSocket debugger URL to attach to.
    #[error("target {id} ({url}) is not attachable")]
    TargetNotAttachable { id: String, url: String },

    /// A CDP command returned an error response.
    #[error("CDP error {code}: {message}")]
    CdpError {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// A CDP command timed out waiting for a response.
    #[error("CDP command '{method}' timed out after {duration:?}")]
    Timeout { method: String, duration: Duration },

    /// A protocol-level error (serialization, unexpected message format).
    #[error("CDP protocol error: {detail}")]
    Protocol { detail: String },

    /// The requested DOM element was not found.
    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    /// Navigation failed.
    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    /// JavaScript evaluation returned an exception.
    #[error("JavaScript exception: {message}")]
    JsException { message: String },

    /// The page did not load within the expected timeout.
    #[error("page load timed out after {duration:?}")]
    PageLoadTimeout { duration: Duration },

    /// An element could not be interacted with (e.g. zero-size).
    #[error("element not interactable: {reason}")]
    ElementNotInteractable { reason: String },
}
