//! High-level page driver wrapping the CDP client.
//!
//! One [`PageDriver`] drives one DevTools page target: navigation,
//! JavaScript evaluation (page context and named content frames), element
//! interaction, screenshots, cookie installation, resource-type blocking and
//! native-dialog auto-response.
//!
//! Frame handles are capabilities, not cached references: a
//! [`FrameHandle`] is resolved by name immediately before use and becomes
//! stale once its frame navigates -- evaluating through a stale handle
//! surfaces a CDP error that callers treat as a structural failure.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::Value;

use encore_types::CookieRecord;

use crate::cdp::{CdpClient, TaskGuard};
use crate::error::BrowserError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque handle to a DOM node, as returned by CDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub i64);

/// Bounding box of a DOM element in CSS pixels.
#[derive(Debug, Clone)]
pub struct ElementBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A live capability into a named content frame.
///
/// Resolved via `Page.getFrameTree` + `Page.createIsolatedWorld`; the
/// execution context dies when the frame navigates, so handles must be
/// re-resolved at the start of every stage that needs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHandle {
    pub frame_id: String,
    pub context_id: u64,
}

/// What to do when the page raises a native confirm/alert dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogPolicy {
    /// Press the affirmative button.
    Accept,
    /// Dismiss the dialog.
    Dismiss,
}

impl DialogPolicy {
    fn accept(self) -> bool {
        matches!(self, DialogPolicy::Accept)
    }
}

/// Disposable subscription created by [`PageDriver::watch_dialogs`]. The
/// responder task stops when this is dropped.
#[derive(Debug)]
pub struct DialogWatcher {
    _task: TaskGuard,
}

/// Request resource types the driver can abort during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Font,
}

impl ResourceKind {
    /// The CDP `Network.ResourceType` name.
    pub fn as_cdp(&self) -> &'static str {
        match self {
            ResourceKind::Image => "Image",
            ResourceKind::Stylesheet => "Stylesheet",
            ResourceKind::Font => "Font",
        }
    }
}

/// Isolated-world name used for frame evaluation contexts.
const FRAME_WORLD_NAME: &str = "encore";

// ---------------------------------------------------------------------------
// PageDriver
// ---------------------------------------------------------------------------

/// High-level driver for one DevTools page target.
pub struct PageDriver {
    client: CdpClient,
    /// Background responder tasks (dialog watcher, resource filter) kept
    /// alive for the driver's lifetime.
    guards: StdMutex<Vec<TaskGuard>>,
}

impl PageDriver {
    /// Connect to a DevTools page target and enable the Page, DOM, Runtime
    /// and Network domains.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let client = CdpClient::connect(ws_url).await?;

        client.enable_domain("Page").await?;
        client.enable_domain("DOM").await?;
        client.enable_domain("Runtime").await?;
        client.enable_domain("Network").await?;

        Ok(Self {
            client,
            guards: StdMutex::new(Vec::new()),
        })
    }

    /// Return a reference to the underlying CDP client for direct command
    /// access.
    pub fn client(&self) -> &CdpClient {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Navigate to a URL and wait for the page load event.
    ///
    /// Navigation-level errors (e.g. net::ERR_NAME_NOT_RESOLVED) surface as
    /// [`BrowserError::NavigationFailed`]; a missing load event within
    /// `load_timeout` surfaces as [`BrowserError::PageLoadTimeout`].
    pub async fn navigate(&self, url: &str, load_timeout: Duration) -> Result<(), BrowserError> {
        // Subscribe before sending so the load event cannot be missed.
        let rx = self.client.subscribe();

        let result = self
            .client
            .send_command("Page.navigate", serde_json::json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(BrowserError::NavigationFailed {
                reason: error_text.to_string(),
            });
        }

        match wait_for_load_event(rx, load_timeout).await {
            Ok(()) => Ok(()),
            Err(BrowserError::Timeout { duration, .. }) => {
                Err(BrowserError::PageLoadTimeout { duration })
            }
            Err(other) => Err(other),
        }
    }

    /// Reload the page. Waits up to `load_timeout` for the load event but
    /// tolerates its absence -- a reload used as mid-poll recovery must not
    /// turn into a hard failure itself.
    pub async fn reload(&self, load_timeout: Duration) -> Result<(), BrowserError> {
        let rx = self.client.subscribe();

        self.client
            .send_command("Page.reload", serde_json::json!({}))
            .await?;

        if let Err(err) = wait_for_load_event(rx, load_timeout).await {
            tracing::debug!(error = %err, "reload finished without a load event");
        }
        Ok(())
    }

    /// Bring the target's window/tab to the foreground.
    pub async fn bring_to_front(&self) -> Result<(), BrowserError> {
        self.client
            .send_command("Page.bringToFront", serde_json::json!({}))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // JavaScript evaluation
    // -----------------------------------------------------------------------

    /// Evaluate a JavaScript expression in the page's default context.
    ///
    /// Returns the evaluated result as a `serde_json::Value`. A thrown
    /// exception is surfaced as [`BrowserError::JsException`].
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let params = serde_json::json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        });
        let result = self.client.send_command("Runtime.evaluate", params).await?;
        extract_evaluation_value(&result)
    }

    /// Evaluate a JavaScript expression inside a resolved content frame.
    ///
    /// A stale handle (the frame navigated since resolution) produces a CDP
    /// error; the caller re-resolves by name and retries or fails its stage.
    pub async fn eval_in_frame(
        &self,
        frame: &FrameHandle,
        expression: &str,
    ) -> Result<Value, BrowserError> {
        let params = serde_json::json!({
            "expression": expression,
            "contextId": frame.context_id,
            "returnByValue": true,
            "awaitPromise": true,
        });
        let result = self.client.send_command("Runtime.evaluate", params).await?;
        extract_evaluation_value(&result)
    }

    // -----------------------------------------------------------------------
    // Frame resolution
    // -----------------------------------------------------------------------

    /// Resolve a content frame by its `name` attribute.
    ///
    /// Walks `Page.getFrameTree`, then creates an isolated world in the
    /// matching frame to obtain an execution context. The flow only touches
    /// the frame's DOM (shared across worlds), so an isolated world is
    /// sufficient and keeps the page's own scripts out of the evaluation
    /// environment.
    pub async fn frame_by_name(&self, name: &str) -> Result<Option<FrameHandle>, BrowserError> {
        let tree = self
            .client
            .send_command("Page.getFrameTree", serde_json::json!({}))
            .await?;

        let Some(frame_id) = tree
            .get("frameTree")
            .and_then(|root| find_frame_id_by_name(root, name))
        else {
            return Ok(None);
        };

        let world = self
            .client
            .send_command(
                "Page.createIsolatedWorld",
                serde_json::json!({
                    "frameId": frame_id,
                    "worldName": FRAME_WORLD_NAME,
                }),
            )
            .await?;

        let context_id = world
            .get("executionContextId")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "createIsolatedWorld did not return an executionContextId".to_string(),
            })?;

        Ok(Some(FrameHandle {
            frame_id,
            context_id,
        }))
    }

    // -----------------------------------------------------------------------
    // DOM queries
    // -----------------------------------------------------------------------

    /// Get the document root node ID.
    async fn get_document_root(&self) -> Result<i64, BrowserError> {
        let result = self
            .client
            .send_command("DOM.getDocument", serde_json::json!({}))
            .await?;

        result
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|n| n.as_i64())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getDocument did not return a root nodeId".to_string(),
            })
    }

    /// Find a single element matching a CSS selector. Returns `Ok(None)`
    /// when no element matches.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, BrowserError> {
        let root_id = self.get_document_root().await?;

        let result = self
            .client
            .send_command(
                "DOM.querySelector",
                serde_json::json!({
                    "nodeId": root_id,
                    "selector": selector,
                }),
            )
            .await?;

        let node_id = result.get("nodeId").and_then(|n| n.as_i64()).unwrap_or(0);

        if node_id == 0 {
            Ok(None)
        } else {
            Ok(Some(NodeId(node_id)))
        }
    }

    /// Get the bounding box of a DOM element via `DOM.getBoxModel`.
    async fn get_element_box(&self, node_id: NodeId) -> Result<ElementBox, BrowserError> {
        let result = self
            .client
            .send_command(
                "DOM.getBoxModel",
                serde_json::json!({ "nodeId": node_id.0 }),
            )
            .await?;

        // The content quad is an array of 8 values: [x1,y1, x2,y2, x3,y3, x4,y4].
        let content = result
            .get("model")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_array())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "DOM.getBoxModel did not return a content quad".to_string(),
            })?;

        let coords: Vec<f64> = content.iter().filter_map(|v| v.as_f64()).collect();
        let bbox = quad_bounding_box(&coords).ok_or_else(|| BrowserError::Protocol {
            detail: format!("content quad has {} values, expected 8", coords.len()),
        })?;

        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Err(BrowserError::ElementNotInteractable {
                reason: format!(
                    "element has zero or negative size: {}x{}",
                    bbox.width, bbox.height
                ),
            });
        }

        Ok(bbox)
    }

    // -----------------------------------------------------------------------
    // Element interaction
    // -----------------------------------------------------------------------

    /// Click an element identified by a CSS selector.
    ///
    /// Finds the element, computes the center of its box model, and
    /// dispatches `mousePressed`/`mouseReleased` input events there.
    pub async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        let bbox = self.get_element_box(node_id).await?;
        let cx = bbox.x + bbox.width / 2.0;
        let cy = bbox.y + bbox.height / 2.0;

        for event_type in ["mousePressed", "mouseReleased"] {
            self.client
                .send_command(
                    "Input.dispatchMouseEvent",
                    serde_json::json!({
                        "type": event_type,
                        "x": cx,
                        "y": cy,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }

        Ok(())
    }

    /// Type text into an element with a fixed pause between characters.
    ///
    /// The per-character delay is an observable side effect: the target
    /// page's input validation watches keystroke cadence, so characters must
    /// not arrive as one burst.
    pub async fn type_text(
        &self,
        selector: &str,
        text: &str,
        per_char_delay: Duration,
    ) -> Result<(), BrowserError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        self.client
            .send_command("DOM.focus", serde_json::json!({ "nodeId": node_id.0 }))
            .await?;

        for ch in text.chars() {
            let ch_str = ch.to_string();

            for event_type in ["keyDown", "keyUp"] {
                self.client
                    .send_command(
                        "Input.dispatchKeyEvent",
                        serde_json::json!({
                            "type": event_type,
                            "text": ch_str,
                            "unmodifiedText": ch_str,
                            "key": ch_str,
                        }),
                    )
                    .await?;
            }

            tokio::time::sleep(per_char_delay).await;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Screenshots and page content
    // -----------------------------------------------------------------------

    /// Capture the full page as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let result = self
            .client
            .send_command(
                "Page.captureScreenshot",
                serde_json::json!({ "format": "png" }),
            )
            .await?;
        decode_screenshot_data(&result)
    }

    /// Capture one element's region as PNG bytes, clipped to its box model.
    pub async fn element_screenshot(&self, selector: &str) -> Result<Vec<u8>, BrowserError> {
        let node_id = self
            .query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        let bbox = self.get_element_box(node_id).await?;
        let result = self
            .client
            .send_command("Page.captureScreenshot", build_clip_capture_params(&bbox))
            .await?;
        decode_screenshot_data(&result)
    }

    /// Get the full HTML of the current page.
    pub async fn html(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("document.documentElement.outerHTML").await?;
        value
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| BrowserError::Protocol {
                detail: "outerHTML evaluation did not return a string".to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Cookies
    // -----------------------------------------------------------------------

    /// Install a cookie jar before navigation.
    pub async fn set_cookies(&self, cookies: &[CookieRecord]) -> Result<(), BrowserError> {
        if cookies.is_empty() {
            return Ok(());
        }
        self.client
            .send_command("Network.setCookies", build_set_cookies_params(cookies))
            .await?;
        Ok(())
    }

    /// Read every cookie the browser currently holds.
    pub async fn get_all_cookies(&self) -> Result<Vec<CookieRecord>, BrowserError> {
        let result = self
            .client
            .send_command("Network.getAllCookies", serde_json::json!({}))
            .await?;

        let cookies = result
            .get("cookies")
            .cloned()
            .ok_or_else(|| BrowserError::Protocol {
                detail: "getAllCookies did not return a cookie list".to_string(),
            })?;

        serde_json::from_value(cookies).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to parse cookies: {e}"),
        })
    }

    // -----------------------------------------------------------------------
    // Resource filtering
    // -----------------------------------------------------------------------

    /// Abort all requests of the given resource types for the rest of the
    /// session. Enables the Fetch domain with per-type patterns and spawns a
    /// responder that fails each paused request.
    pub async fn block_resource_types(&self, kinds: &[ResourceKind]) -> Result<(), BrowserError> {
        if kinds.is_empty() {
            return Ok(());
        }

        let patterns: Vec<Value> = kinds
            .iter()
            .map(|k| {
                serde_json::json!({
                    "resourceType": k.as_cdp(),
                    "requestStage": "Request",
                })
            })
            .collect();

        self.client
            .send_command("Fetch.enable", serde_json::json!({ "patterns": patterns }))
            .await?;

        let client = self.client.clone();
        let mut rx = client.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.method == "Fetch.requestPaused" => {
                        let Some(request_id) =
                            event.params.get("requestId").and_then(|v| v.as_str())
                        else {
                            continue;
                        };
                        let params = serde_json::json!({
                            "requestId": request_id,
                            "errorReason": "Aborted",
                        });
                        if let Err(e) = client.send_command("Fetch.failRequest", params).await {
                            tracing::debug!(error = %e, "failed to abort filtered request");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.retain_guard(TaskGuard::new(handle));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Native dialogs
    // -----------------------------------------------------------------------

    /// Subscribe a responder that answers every native dialog according to
    /// `policy`. The subscription ends when the returned watcher is dropped.
    pub fn watch_dialogs(&self, policy: DialogPolicy) -> DialogWatcher {
        let client = self.client.clone();
        let mut rx = client.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.method == "Page.javascriptDialogOpening" => {
                        let message = event
                            .params
                            .get("message")
                            .and_then(|v| v.as_str())
                            .unwrap_or("");
                        tracing::info!(message, accept = policy.accept(), "native dialog raised");
                        let params = serde_json::json!({ "accept": policy.accept() });
                        if let Err(e) = client
                            .send_command("Page.handleJavaScriptDialog", params)
                            .await
                        {
                            tracing::warn!(error = %e, "failed to answer native dialog");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        DialogWatcher {
            _task: TaskGuard::new(handle),
        }
    }

    /// Keep a dialog watcher alive for the driver's lifetime.
    pub fn retain_dialog_watcher(&self, watcher: DialogWatcher) {
        self.retain_guard(watcher._task);
    }

    fn retain_guard(&self, guard: TaskGuard) {
        if let Ok(mut guards) = self.guards.lock() {
            guards.push(guard);
        }
    }
}

// ---------------------------------------------------------------------------
// Parameter building / response parsing helpers
// ---------------------------------------------------------------------------

/// Drain an already-open event subscription until `Page.loadEventFired`
/// arrives or the timeout elapses.
async fn wait_for_load_event(
    mut rx: tokio::sync::broadcast::Receiver<crate::cdp::CdpEvent>,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(BrowserError::Timeout {
                method: "Page.loadEventFired".to_string(),
                duration: timeout,
            });
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if event.method == "Page.loadEventFired" => return Ok(()),
            Ok(Ok(_)) => continue,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => {
                return Err(BrowserError::Protocol {
                    detail: "WebSocket closed while waiting for page load".to_string(),
                });
            }
            Err(_) => {
                return Err(BrowserError::Timeout {
                    method: "Page.loadEventFired".to_string(),
                    duration: timeout,
                });
            }
        }
    }
}

/// Extract the value from a `Runtime.evaluate` response, surfacing thrown
/// exceptions.
fn extract_evaluation_value(result: &Value) -> Result<Value, BrowserError> {
    if let Some(exception) = result.get("exceptionDetails") {
        let message = exception
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|d| d.as_str())
            .or_else(|| exception.get("text").and_then(|t| t.as_str()))
            .unwrap_or("unknown exception")
            .to_string();
        return Err(BrowserError::JsException { message });
    }

    Ok(result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null))
}

/// Decode the base64 `data` field of a `Page.captureScreenshot` response.
fn decode_screenshot_data(result: &Value) -> Result<Vec<u8>, BrowserError> {
    let data_b64 = result
        .get("data")
        .and_then(|d| d.as_str())
        .ok_or_else(|| BrowserError::Protocol {
            detail: "captureScreenshot did not return 'data' field".to_string(),
        })?;

    B64.decode(data_b64).map_err(|e| BrowserError::Protocol {
        detail: format!("failed to decode screenshot base64: {e}"),
    })
}

/// Recursively search a `Page.getFrameTree` node for a frame whose `name`
/// matches, returning its frame ID.
fn find_frame_id_by_name(node: &Value, name: &str) -> Option<String> {
    let frame = node.get("frame")?;
    if frame.get("name").and_then(|n| n.as_str()) == Some(name) {
        return frame
            .get("id")
            .and_then(|id| id.as_str())
            .map(|s| s.to_string());
    }
    node.get("childFrames")?
        .as_array()?
        .iter()
        .find_map(|child| find_frame_id_by_name(child, name))
}

/// Build `Page.captureScreenshot` parameters clipped to an element box.
pub fn build_clip_capture_params(bbox: &ElementBox) -> Value {
    serde_json::json!({
        "format": "png",
        "clip": {
            "x": bbox.x,
            "y": bbox.y,
            "width": bbox.width,
            "height": bbox.height,
            "scale": 1.0,
        },
    })
}

/// Build `Network.setCookies` parameters from persisted cookie records.
///
/// Non-positive expiry values mark session cookies and are omitted so the
/// browser treats them as such.
pub fn build_set_cookies_params(cookies: &[CookieRecord]) -> Value {
    let entries: Vec<Value> = cookies
        .iter()
        .map(|c| {
            let mut obj = serde_json::json!({
                "name": c.name,
                "value": c.value,
                "domain": c.domain,
                "path": c.path,
                "secure": c.secure,
                "httpOnly": c.http_only,
            });
            if let Some(expires) = c.expires.filter(|e| *e > 0.0) {
                obj["expires"] = serde_json::json!(expires);
            }
            if let Some(same_site) = &c.same_site {
                obj["sameSite"] = serde_json::json!(same_site);
            }
            obj
        })
        .collect();
    serde_json::json!({ "cookies": entries })
}

/// Compute the bounding box of a content quad (8-element coordinate array).
pub fn quad_bounding_box(quad: &[f64]) -> Option<ElementBox> {
    if quad.len() < 8 {
        return None;
    }
    let xs: Vec<f64> = quad.iter().step_by(2).copied().collect();
    let ys: Vec<f64> = quad.iter().skip(1).step_by(2).copied().collect();
    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    Some(ElementBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- Parameter builders -------------------------------------------------

    #[test]
    fn test_build_clip_capture_params() {
        let bbox = ElementBox {
            x: 10.0,
            y: 20.0,
            width: 200.0,
            height: 60.0,
        };
        let params = build_clip_capture_params(&bbox);
        assert_eq!(params["format"], "png");
        assert_eq!(params["clip"]["x"], 10.0);
        assert_eq!(params["clip"]["y"], 20.0);
        assert_eq!(params["clip"]["width"], 200.0);
        assert_eq!(params["clip"]["height"], 60.0);
        assert_eq!(params["clip"]["scale"], 1.0);
    }

    #[test]
    fn test_build_set_cookies_params() {
        let cookies = vec![CookieRecord {
            name: "SESSID".to_string(),
            value: "abc".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            expires: Some(1_900_000_000.0),
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
        }];
        let params = build_set_cookies_params(&cookies);
        let entry = &params["cookies"][0];
        assert_eq!(entry["name"], "SESSID");
        assert_eq!(entry["domain"], ".example.com");
        assert_eq!(entry["expires"], 1_900_000_000.0);
        assert_eq!(entry["httpOnly"], true);
        assert_eq!(entry["sameSite"], "Lax");
    }

    #[test]
    fn test_build_set_cookies_params_session_cookie_has_no_expiry() {
        let cookies = vec![CookieRecord {
            name: "t".to_string(),
            value: "v".to_string(),
            domain: "example.com".to_string(),
            path: "/".to_string(),
            expires: Some(-1.0),
            http_only: false,
            secure: false,
            same_site: None,
        }];
        let params = build_set_cookies_params(&cookies);
        let entry = &params["cookies"][0];
        assert!(entry.get("expires").is_none());
        assert!(entry.get("sameSite").is_none());
    }

    // -- Quad math ----------------------------------------------------------

    #[test]
    fn test_quad_bounding_box_basic() {
        let quad = [0.0, 0.0, 100.0, 0.0, 100.0, 100.0, 0.0, 100.0];
        let bbox = quad_bounding_box(&quad).unwrap();
        assert!((bbox.x - 0.0).abs() < 0.001);
        assert!((bbox.width - 100.0).abs() < 0.001);
        assert!((bbox.height - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_quad_bounding_box_offset() {
        let quad = [50.0, 75.0, 250.0, 75.0, 250.0, 175.0, 50.0, 175.0];
        let bbox = quad_bounding_box(&quad).unwrap();
        assert!((bbox.x - 50.0).abs() < 0.001);
        assert!((bbox.y - 75.0).abs() < 0.001);
        assert!((bbox.width - 200.0).abs() < 0.001);
        assert!((bbox.height - 100.0).abs() < 0.001);
    }

    #[test]
    fn test_quad_bounding_box_too_few_values() {
        assert!(quad_bounding_box(&[0.0, 0.0, 100.0, 0.0]).is_none());
        assert!(quad_bounding_box(&[]).is_none());
    }

    // -- Response parsing ---------------------------------------------------

    #[test]
    fn test_extract_evaluation_value() {
        let response = serde_json::json!({
            "result": { "type": "number", "value": 42 }
        });
        assert_eq!(extract_evaluation_value(&response).unwrap(), 42);
    }

    #[test]
    fn test_extract_evaluation_value_undefined_is_null() {
        let response = serde_json::json!({
            "result": { "type": "undefined" }
        });
        assert_eq!(extract_evaluation_value(&response).unwrap(), Value::Null);
    }

    #[test]
    fn test_extract_evaluation_value_exception() {
        let response = serde_json::json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": {
                    "description": "ReferenceError: reservationModule is not defined"
                }
            }
        });
        let err = extract_evaluation_value(&response).unwrap_err();
        match err {
            BrowserError::JsException { message } => {
                assert!(message.contains("reservationModule"));
            }
            other => panic!("expected JsException, got: {other:?}"),
        }
    }

    #[test]
    fn test_decode_screenshot_data() {
        let fake_png = vec![0x89, 0x50, 0x4E, 0x47];
        let response = serde_json::json!({ "data": B64.encode(&fake_png) });
        assert_eq!(decode_screenshot_data(&response).unwrap(), fake_png);
    }

    #[test]
    fn test_decode_screenshot_data_missing_field() {
        let response = serde_json::json!({});
        assert!(decode_screenshot_data(&response).is_err());
    }

    // -- Frame tree search --------------------------------------------------

    fn sample_frame_tree() -> Value {
        serde_json::json!({
            "frame": { "id": "ROOT", "name": "" },
            "childFrames": [
                {
                    "frame": { "id": "AD", "name": "adFrame" }
                },
                {
                    "frame": { "id": "BOOKING", "name": "oneStopFrame" },
                    "childFrames": [
                        { "frame": { "id": "NESTED", "name": "inner" } }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_find_frame_by_name() {
        let tree = sample_frame_tree();
        assert_eq!(
            find_frame_id_by_name(&tree, "oneStopFrame"),
            Some("BOOKING".to_string())
        );
    }

    #[test]
    fn test_find_frame_by_name_nested() {
        let tree = sample_frame_tree();
        assert_eq!(
            find_frame_id_by_name(&tree, "inner"),
            Some("NESTED".to_string())
        );
    }

    #[test]
    fn test_find_frame_by_name_missing() {
        let tree = sample_frame_tree();
        assert_eq!(find_frame_id_by_name(&tree, "paymentFrame"), None);
    }

    // -- Misc types ---------------------------------------------------------

    #[test]
    fn test_resource_kind_cdp_names() {
        assert_eq!(ResourceKind::Image.as_cdp(), "Image");
        assert_eq!(ResourceKind::Stylesheet.as_cdp(), "Stylesheet");
        assert_eq!(ResourceKind::Font.as_cdp(), "Font");
    }

    #[test]
    fn test_dialog_policy_accept_flag() {
        assert!(DialogPolicy::Accept.accept());
        assert!(!DialogPolicy::Dismiss.accept());
    }

    #[test]
    fn test_frame_handle_equality() {
        let a = FrameHandle {
            frame_id: "F1".to_string(),
            context_id: 3,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
