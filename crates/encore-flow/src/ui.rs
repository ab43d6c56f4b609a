//! The seam between flow components and the browser driver.
//!
//! Flow components are generic over [`PageOps`] (one page or popup window)
//! and the orchestrator over [`SessionBrowser`] (target discovery and
//! lifecycle), so every stage runs unchanged against the real CDP driver or
//! against the scripted mocks in [`crate::mock`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use encore_browser::{
    DialogPolicy, FrameHandle, LaunchedBrowser, PageDriver, ResourceKind,
};
use encore_types::CookieRecord;

use crate::FlowError;

/// Load-event timeout for full navigations.
const NAVIGATION_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Load-event timeout for mid-poll recovery reloads; shorter, and a miss is
/// tolerated by the driver.
const RELOAD_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Operations a flow stage performs against one page (the performance page
/// or the seat-selection popup).
#[async_trait]
pub trait PageOps: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), FlowError>;
    async fn reload(&self) -> Result<(), FlowError>;
    async fn bring_to_front(&self) -> Result<(), FlowError>;

    /// Evaluate JavaScript in the page's default context.
    async fn evaluate(&self, expression: &str) -> Result<Value, FlowError>;

    /// Resolve a content frame by name. Handles are stage-local; every stage
    /// that needs the frame re-resolves it.
    async fn frame_by_name(&self, name: &str) -> Result<Option<FrameHandle>, FlowError>;

    /// Evaluate JavaScript inside a resolved content frame.
    async fn eval_in_frame(&self, frame: &FrameHandle, expression: &str)
        -> Result<Value, FlowError>;

    /// Click an element via trusted input events.
    async fn click(&self, selector: &str) -> Result<(), FlowError>;

    /// Type text with a fixed pause between characters. The cadence is
    /// observable by the page's input validation.
    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        per_char_delay: Duration,
    ) -> Result<(), FlowError>;

    /// Capture one element's region as PNG bytes.
    async fn element_screenshot(&self, selector: &str) -> Result<Vec<u8>, FlowError>;

    /// Capture the full page as PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, FlowError>;

    /// The page's full markup.
    async fn html(&self) -> Result<String, FlowError>;

    /// Install a cookie jar.
    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<(), FlowError>;

    /// Abort all requests of the given resource types from now on.
    async fn block_resource_types(&self, kinds: &[ResourceKind]) -> Result<(), FlowError>;

    /// Subscribe a responder answering every native dialog per `policy` for
    /// the rest of the page's lifetime.
    async fn auto_respond_dialogs(&self, policy: DialogPolicy) -> Result<(), FlowError>;
}

/// Browser-level operations the orchestrator needs: attaching pages and
/// releasing the process.
#[async_trait]
pub trait SessionBrowser: Send + Sync {
    type Page: PageOps + Send + Sync;

    /// Attach to the browser's initial page.
    async fn attach_initial(&self) -> Result<Self::Page, FlowError>;

    /// Attach to a page whose URL contains `fragment`, if one exists right
    /// now. One probe of the popup-detection loop.
    async fn attach_matching(&self, fragment: &str) -> Result<Option<Self::Page>, FlowError>;

    /// Release the browser process. Always called on the way out, success
    /// or failure.
    async fn close(&self);
}

/// Truthiness of an evaluated value, for presence/flag checks.
pub fn value_is_true(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Real driver implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl PageOps for PageDriver {
    async fn navigate(&self, url: &str) -> Result<(), FlowError> {
        PageDriver::navigate(self, url, NAVIGATION_LOAD_TIMEOUT)
            .await
            .map_err(FlowError::from)
    }

    async fn reload(&self) -> Result<(), FlowError> {
        PageDriver::reload(self, RELOAD_LOAD_TIMEOUT)
            .await
            .map_err(FlowError::from)
    }

    async fn bring_to_front(&self) -> Result<(), FlowError> {
        PageDriver::bring_to_front(self).await.map_err(FlowError::from)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, FlowError> {
        PageDriver::evaluate(self, expression)
            .await
            .map_err(FlowError::from)
    }

    async fn frame_by_name(&self, name: &str) -> Result<Option<FrameHandle>, FlowError> {
        PageDriver::frame_by_name(self, name)
            .await
            .map_err(FlowError::from)
    }

    async fn eval_in_frame(
        &self,
        frame: &FrameHandle,
        expression: &str,
    ) -> Result<Value, FlowError> {
        PageDriver::eval_in_frame(self, frame, expression)
            .await
            .map_err(FlowError::from)
    }

    async fn click(&self, selector: &str) -> Result<(), FlowError> {
        PageDriver::click(self, selector).await.map_err(FlowError::from)
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        per_char_delay: Duration,
    ) -> Result<(), FlowError> {
        PageDriver::type_text(self, selector, text, per_char_delay)
            .await
            .map_err(FlowError::from)
    }

    async fn element_screenshot(&self, selector: &str) -> Result<Vec<u8>, FlowError> {
        PageDriver::element_screenshot(self, selector)
            .await
            .map_err(FlowError::from)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, FlowError> {
        PageDriver::screenshot(self).await.map_err(FlowError::from)
    }

    async fn html(&self) -> Result<String, FlowError> {
        PageDriver::html(self).await.map_err(FlowError::from)
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<(), FlowError> {
        PageDriver::set_cookies(self, cookies)
            .await
            .map_err(FlowError::from)
    }

    async fn block_resource_types(&self, kinds: &[ResourceKind]) -> Result<(), FlowError> {
        PageDriver::block_resource_types(self, kinds)
            .await
            .map_err(FlowError::from)
    }

    async fn auto_respond_dialogs(&self, policy: DialogPolicy) -> Result<(), FlowError> {
        let watcher = self.watch_dialogs(policy);
        self.retain_dialog_watcher(watcher);
        Ok(())
    }
}

#[async_trait]
impl SessionBrowser for LaunchedBrowser {
    type Page = PageDriver;

    async fn attach_initial(&self) -> Result<PageDriver, FlowError> {
        self.attach_first_page().await.map_err(FlowError::from)
    }

    async fn attach_matching(&self, fragment: &str) -> Result<Option<PageDriver>, FlowError> {
        LaunchedBrowser::attach_matching(self, fragment)
            .await
            .map_err(FlowError::from)
    }

    async fn close(&self) {
        self.kill();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_true() {
        assert!(value_is_true(&serde_json::json!(true)));
        assert!(!value_is_true(&serde_json::json!(false)));
        assert!(!value_is_true(&Value::Null));
        // Non-boolean truthiness is not inferred; scripts return booleans.
        assert!(!value_is_true(&serde_json::json!(1)));
        assert!(!value_is_true(&serde_json::json!("true")));
    }
}
