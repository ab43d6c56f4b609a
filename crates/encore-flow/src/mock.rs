//! Scripted test doubles for the driver seam.
//!
//! [`ScriptedPage`] answers evaluations from needle-matched response queues
//! and records every call; [`ScriptedBrowser`] scripts target discovery.
//! Both use `Arc<Mutex<_>>` interior state so clones share one script and
//! one call log, and tests can inspect a page after handing it to the flow.
//!
//! Evaluation rules are matched in insertion order by substring: the first
//! rule whose needle occurs in the evaluated expression answers it. Insert
//! the most specific needles first. A rule's queue serves its responses in
//! order and then keeps repeating the last one, so a single-response rule
//! behaves like a constant.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use encore_browser::{DialogPolicy, FrameHandle, ResourceKind};
use encore_types::CookieRecord;

use crate::ui::{PageOps, SessionBrowser};
use crate::FlowError;

// ---------------------------------------------------------------------------
// Call log
// ---------------------------------------------------------------------------

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq)]
pub enum PageCall {
    Navigate(String),
    Reload,
    BringToFront,
    Eval(String),
    FrameLookup(String),
    FrameEval(String),
    Click(String),
    Type {
        selector: String,
        text: String,
        delay_ms: u64,
    },
    ElementScreenshot(String),
    Screenshot,
    Html,
    SetCookies(usize),
    BlockResources(usize),
    WatchDialogs { accept: bool },
}

// ---------------------------------------------------------------------------
// ScriptedPage
// ---------------------------------------------------------------------------

struct EvalRule {
    needle: String,
    responses: VecDeque<Value>,
}

#[derive(Default)]
struct PageInner {
    eval_rules: Vec<EvalRule>,
    frames: VecDeque<Option<FrameHandle>>,
    element_shots: VecDeque<Vec<u8>>,
    page_screenshot: Vec<u8>,
    page_html: String,
    nav_failures: u32,
    calls: Vec<PageCall>,
}

/// A page double answering from scripted response queues.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    inner: Arc<Mutex<PageInner>>,
}

impl ScriptedPage {
    pub fn builder() -> ScriptedPageBuilder {
        ScriptedPageBuilder {
            inner: PageInner::default(),
        }
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<PageCall> {
        self.inner
            .lock()
            .map(|inner| inner.calls.clone())
            .unwrap_or_default()
    }

    /// Number of trusted clicks recorded on `selector`.
    pub fn click_count(&self, selector: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, PageCall::Click(s) if s == selector))
            .count()
    }

    /// Number of frame evaluations whose expression contains `needle`.
    pub fn frame_eval_count(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, PageCall::FrameEval(expr) if expr.contains(needle)))
            .count()
    }

    /// All `(selector, text)` pairs typed into the page.
    pub fn typed_entries(&self) -> Vec<(String, String)> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                PageCall::Type { selector, text, .. } => Some((selector.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: PageCall) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.calls.push(call);
        }
    }

    /// Pop the next response, repeating the last one once the queue is down
    /// to a single entry.
    fn pop_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn eval_response(&self, expression: &str) -> Result<Value, FlowError> {
        let mut inner = self.inner.lock().map_err(|_| FlowError::UnexpectedValue {
            detail: "mock state poisoned".to_string(),
        })?;
        for rule in inner.eval_rules.iter_mut() {
            if expression.contains(rule.needle.as_str()) {
                if let Some(response) = Self::pop_sticky(&mut rule.responses) {
                    return Ok(response);
                }
            }
        }
        Err(FlowError::UnexpectedValue {
            detail: format!("no scripted response for: {expression}"),
        })
    }
}

/// Fluent setup for [`ScriptedPage`].
pub struct ScriptedPageBuilder {
    inner: PageInner,
}

impl ScriptedPageBuilder {
    /// Append a response for evaluations containing `needle`. Calling this
    /// repeatedly with the same needle queues responses in order.
    pub fn eval(mut self, needle: &str, response: impl Into<Value>) -> Self {
        let response = response.into();
        if let Some(rule) = self
            .inner
            .eval_rules
            .iter_mut()
            .find(|r| r.needle == needle)
        {
            rule.responses.push_back(response);
        } else {
            self.inner.eval_rules.push(EvalRule {
                needle: needle.to_string(),
                responses: VecDeque::from([response]),
            });
        }
        self
    }

    /// Queue a frame-lookup result (sticky-last, like eval responses).
    pub fn frame(mut self, frame: Option<FrameHandle>) -> Self {
        self.inner.frames.push_back(frame);
        self
    }

    /// Queue an element-screenshot result.
    pub fn element_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.inner.element_shots.push_back(bytes);
        self
    }

    pub fn page_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.inner.page_screenshot = bytes;
        self
    }

    pub fn html(mut self, markup: &str) -> Self {
        self.inner.page_html = markup.to_string();
        self
    }

    /// Make the next `times` navigations fail.
    pub fn fail_navigation(mut self, times: u32) -> Self {
        self.inner.nav_failures = times;
        self
    }

    pub fn build(self) -> ScriptedPage {
        ScriptedPage {
            inner: Arc::new(Mutex::new(self.inner)),
        }
    }
}

#[async_trait]
impl PageOps for ScriptedPage {
    async fn navigate(&self, url: &str) -> Result<(), FlowError> {
        self.record(PageCall::Navigate(url.to_string()));
        let mut inner = self.inner.lock().map_err(|_| FlowError::UnexpectedValue {
            detail: "mock state poisoned".to_string(),
        })?;
        if inner.nav_failures > 0 {
            inner.nav_failures -= 1;
            return Err(FlowError::UnexpectedValue {
                detail: "scripted navigation failure".to_string(),
            });
        }
        Ok(())
    }

    async fn reload(&self) -> Result<(), FlowError> {
        self.record(PageCall::Reload);
        Ok(())
    }

    async fn bring_to_front(&self) -> Result<(), FlowError> {
        self.record(PageCall::BringToFront);
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, FlowError> {
        self.record(PageCall::Eval(expression.to_string()));
        self.eval_response(expression)
    }

    async fn frame_by_name(&self, name: &str) -> Result<Option<FrameHandle>, FlowError> {
        self.record(PageCall::FrameLookup(name.to_string()));
        let mut inner = self.inner.lock().map_err(|_| FlowError::UnexpectedValue {
            detail: "mock state poisoned".to_string(),
        })?;
        Ok(Self::pop_sticky(&mut inner.frames).flatten())
    }

    async fn eval_in_frame(
        &self,
        _frame: &FrameHandle,
        expression: &str,
    ) -> Result<Value, FlowError> {
        self.record(PageCall::FrameEval(expression.to_string()));
        self.eval_response(expression)
    }

    async fn click(&self, selector: &str) -> Result<(), FlowError> {
        self.record(PageCall::Click(selector.to_string()));
        Ok(())
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        per_char_delay: Duration,
    ) -> Result<(), FlowError> {
        self.record(PageCall::Type {
            selector: selector.to_string(),
            text: text.to_string(),
            delay_ms: per_char_delay.as_millis() as u64,
        });
        Ok(())
    }

    async fn element_screenshot(&self, selector: &str) -> Result<Vec<u8>, FlowError> {
        self.record(PageCall::ElementScreenshot(selector.to_string()));
        let mut inner = self.inner.lock().map_err(|_| FlowError::UnexpectedValue {
            detail: "mock state poisoned".to_string(),
        })?;
        Self::pop_sticky(&mut inner.element_shots).ok_or_else(|| FlowError::ElementMissing {
            selector: selector.to_string(),
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>, FlowError> {
        self.record(PageCall::Screenshot);
        Ok(self
            .inner
            .lock()
            .map(|inner| inner.page_screenshot.clone())
            .unwrap_or_default())
    }

    async fn html(&self) -> Result<String, FlowError> {
        self.record(PageCall::Html);
        Ok(self
            .inner
            .lock()
            .map(|inner| inner.page_html.clone())
            .unwrap_or_default())
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<(), FlowError> {
        self.record(PageCall::SetCookies(cookies.len()));
        Ok(())
    }

    async fn block_resource_types(&self, kinds: &[ResourceKind]) -> Result<(), FlowError> {
        self.record(PageCall::BlockResources(kinds.len()));
        Ok(())
    }

    async fn auto_respond_dialogs(&self, policy: DialogPolicy) -> Result<(), FlowError> {
        self.record(PageCall::WatchDialogs {
            accept: policy == DialogPolicy::Accept,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedBrowser
// ---------------------------------------------------------------------------

/// A browser double scripting target discovery.
#[derive(Clone)]
pub struct ScriptedBrowser {
    initial: ScriptedPage,
    popups: Arc<Mutex<VecDeque<Option<ScriptedPage>>>>,
    closed: Arc<AtomicBool>,
    popup_probes: Arc<AtomicU32>,
}

impl ScriptedBrowser {
    pub fn new(initial: ScriptedPage) -> Self {
        Self {
            initial,
            popups: Arc::new(Mutex::new(VecDeque::new())),
            closed: Arc::new(AtomicBool::new(false)),
            popup_probes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Script the popup probe results (sticky-last). `None` entries model
    /// probes before the popup window exists.
    pub fn with_popup_sequence(self, sequence: Vec<Option<ScriptedPage>>) -> Self {
        if let Ok(mut popups) = self.popups.lock() {
            popups.extend(sequence);
        }
        self
    }

    /// Whether the browser was released.
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How many popup probes ran.
    pub fn popup_probes(&self) -> u32 {
        self.popup_probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionBrowser for ScriptedBrowser {
    type Page = ScriptedPage;

    async fn attach_initial(&self) -> Result<ScriptedPage, FlowError> {
        Ok(self.initial.clone())
    }

    async fn attach_matching(&self, _fragment: &str) -> Result<Option<ScriptedPage>, FlowError> {
        self.popup_probes.fetch_add(1, Ordering::SeqCst);
        let mut popups = self.popups.lock().map_err(|_| FlowError::UnexpectedValue {
            detail: "mock state poisoned".to_string(),
        })?;
        Ok(ScriptedPage::pop_sticky(&mut popups).flatten())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// A frame handle for scripting frame lookups.
pub fn frame_fixture(frame_id: &str, context_id: u64) -> FrameHandle {
    FrameHandle {
        frame_id: frame_id.to_string(),
        context_id,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_eval_rules_match_in_insertion_order() {
        let page = ScriptedPage::builder()
            .eval("#nextPayment", true)
            .eval("dispatchEvent", false)
            .build();

        // Both needles occur; the first inserted rule wins.
        let value = page
            .evaluate("q('#nextPayment').dispatchEvent(new MouseEvent('click'))")
            .await
            .unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_eval_queue_is_sticky_on_last_response() {
        let page = ScriptedPage::builder()
            .eval("flag", false)
            .eval("flag", true)
            .build();

        assert_eq!(page.evaluate("flag").await.unwrap(), Value::Bool(false));
        assert_eq!(page.evaluate("flag").await.unwrap(), Value::Bool(true));
        // Last response repeats.
        assert_eq!(page.evaluate("flag").await.unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn test_unmatched_eval_is_an_error() {
        let page = ScriptedPage::builder().build();
        let result = page.evaluate("somethingUnscripted()").await;
        assert!(matches!(result, Err(FlowError::UnexpectedValue { .. })));
    }

    #[tokio::test]
    async fn test_frame_queue_and_element_shots() {
        let page = ScriptedPage::builder()
            .frame(None)
            .frame(Some(frame_fixture("F1", 7)))
            .element_screenshot(vec![1, 2, 3])
            .build();

        assert!(page.frame_by_name("oneStopFrame").await.unwrap().is_none());
        let frame = page.frame_by_name("oneStopFrame").await.unwrap().unwrap();
        assert_eq!(frame.frame_id, "F1");
        // Sticky last.
        assert!(page.frame_by_name("oneStopFrame").await.unwrap().is_some());

        assert_eq!(page.element_screenshot("#img").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_element_shot_queue_reports_missing_element() {
        let page = ScriptedPage::builder().build();
        let result = page.element_screenshot("#captchaImg").await;
        assert!(matches!(result, Err(FlowError::ElementMissing { .. })));
    }

    #[tokio::test]
    async fn test_scripted_browser_popup_sequence() {
        let popup = ScriptedPage::builder().build();
        let browser = ScriptedBrowser::new(ScriptedPage::builder().build())
            .with_popup_sequence(vec![None, Some(popup)]);

        assert!(browser.attach_matching("onestop.htm").await.unwrap().is_none());
        assert!(browser.attach_matching("onestop.htm").await.unwrap().is_some());
        assert_eq!(browser.popup_probes(), 2);
        assert!(!browser.closed());
        browser.close().await;
        assert!(browser.closed());
    }

    #[tokio::test]
    async fn test_call_recording() {
        let page = ScriptedPage::builder().eval("x", true).build();
        page.navigate("https://example.com").await.unwrap();
        page.click("#btn").await.unwrap();
        page.type_text("#input", "ABCDEF", Duration::from_millis(100))
            .await
            .unwrap();
        let _ = page.evaluate("x").await;

        let calls = page.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], PageCall::Navigate("https://example.com".to_string()));
        assert_eq!(page.click_count("#btn"), 1);
        assert_eq!(
            page.typed_entries(),
            vec![("#input".to_string(), "ABCDEF".to_string())]
        );
    }
}
