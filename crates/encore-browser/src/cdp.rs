//! Low-level CDP (Chrome DevTools Protocol) WebSocket client.
//!
//! Connects to one DevTools page target and provides JSON-RPC 2.0
//! command/response correlation plus a broadcast event bus. Several
//! consumers need events at once -- page-load waits, the dialog
//! auto-responder and the resource-filter responder all subscribe
//! independently -- so events fan out over a `tokio::sync::broadcast`
//! channel instead of a single receiver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Fan-out capacity of the event bus. Slow subscribers that fall further
/// behind than this observe a `Lagged` error and skip ahead.
const EVENT_BUS_CAPACITY: usize = 256;

/// A CDP event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// The event method name (e.g. "Page.javascriptDialogOpening").
    pub method: String,
    /// The event parameters.
    pub params: Value,
}

/// A CDP command to send to the browser.
#[derive(Debug, Clone, serde::Serialize)]
struct CdpCommand {
    id: u64,
    method: String,
    params: Value,
}

/// A CDP response from the browser.
#[derive(Debug, Clone)]
pub struct CdpResponse {
    /// The command ID this response correlates to.
    pub id: u64,
    /// The result value on success.
    pub result: Option<Value>,
    /// The error object on failure.
    pub error: Option<CdpResponseError>,
}

/// Error object in a CDP response.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CdpResponseError {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

/// Owns a background task and aborts it when dropped.
#[derive(Debug)]
pub struct TaskGuard(tokio::task::JoinHandle<()>);

impl TaskGuard {
    pub fn new(handle: tokio::task::JoinHandle<()>) -> Self {
        Self(handle)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ---------------------------------------------------------------------------
// CdpClient
// ---------------------------------------------------------------------------

/// CDP client managing a WebSocket connection to one DevTools target.
///
/// Commands are sent with auto-incrementing IDs and responses are correlated
/// back to the caller. Events fan out to any number of subscribers. The
/// client is cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct CdpClient {
    /// Auto-incrementing command ID counter.
    next_id: Arc<AtomicU64>,
    /// Pending commands awaiting responses: id -> oneshot sender.
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
    /// WebSocket write half, wrapped in a mutex for shared access.
    writer: Arc<Mutex<WsSink>>,
    /// Event bus; keep a sender so new subscriptions can be created.
    events: broadcast::Sender<CdpEvent>,
    /// Background reader task, aborted when the last clone drops.
    _reader: Arc<TaskGuard>,
}

impl CdpClient {
    /// Connect to a DevTools WebSocket endpoint of the form
    /// `ws://localhost:{port}/devtools/page/{target_id}`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        tracing::debug!(url = ws_url, "connecting to DevTools WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = ws_stream.split();

        let next_id = Arc::new(AtomicU64::new(1));
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);

        let pending_clone = Arc::clone(&pending);
        let event_tx_clone = event_tx.clone();
        let reader_handle = tokio::spawn(async move {
            Self::read_loop(reader, pending_clone, event_tx_clone).await;
        });

        tracing::debug!(url = ws_url, "DevTools WebSocket connection established");

        Ok(Self {
            next_id,
            pending,
            writer: Arc::new(Mutex::new(writer)),
            events: event_tx,
            _reader: Arc::new(TaskGuard::new(reader_handle)),
        })
    }

    /// Send a CDP command and wait for its response with the default timeout.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.send_command_with_timeout(method, params, Duration::from_secs(30))
            .await
    }

    /// Send a CDP command with a custom timeout.
    pub async fn send_command_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let cmd = CdpCommand {
            id,
            method: method.to_string(),
            params,
        };

        let json = serde_json::to_string(&cmd).map_err(|e| BrowserError::Protocol {
            detail: format!("failed to serialize command: {e}"),
        })?;

        tracing::trace!(id = id, method = method, "sending CDP command");

        // Register the pending response before sending to avoid races.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(json.into()))
                .await
                .map_err(|e| BrowserError::Protocol {
                    detail: format!("failed to send WebSocket message: {e}"),
                })?;
        }

        let response = tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| BrowserError::Timeout {
                method: method.to_string(),
                duration: timeout,
            })?
            .map_err(|_| BrowserError::Protocol {
                detail: "response channel closed unexpectedly".to_string(),
            })?;

        if let Some(err) = response.error {
            return Err(BrowserError::CdpError {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Subscribe to the event bus. Each subscriber sees every event emitted
    /// after the subscription was created.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Wait for the next occurrence of a specific event method.
    pub async fn wait_for_event(
        &self,
        method: &str,
        timeout: Duration,
    ) -> Result<CdpEvent, BrowserError> {
        let mut rx = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(BrowserError::Timeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }

            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) if event.method == method => return Ok(event),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    tracing::debug!(skipped, "event subscriber lagged; continuing");
                    continue;
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(BrowserError::Protocol {
                        detail: "WebSocket closed while waiting for event".to_string(),
                    });
                }
                Err(_) => {
                    return Err(BrowserError::Timeout {
                        method: method.to_string(),
                        duration: timeout,
                    });
                }
            }
        }
    }

    /// Enable a CDP domain (e.g. "Page", "DOM", "Runtime").
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        let method = format!("{domain}.enable");
        self.send_command(&method, serde_json::json!({})).await?;
        Ok(())
    }

    /// Background task that reads WebSocket messages and dispatches them.
    ///
    /// - Messages with an `id` field are responses to pending commands.
    /// - Messages with a `method` field (and no `id`) are events.
    async fn read_loop(
        mut reader: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
        event_tx: broadcast::Sender<CdpEvent>,
    ) {
        while let Some(msg_result) = reader.next().await {
            let msg = match msg_result {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket read error, stopping reader");
                    break;
                }
            };

            let text = match msg {
                Message::Text(t) => t.to_string(),
                Message::Binary(b) => match String::from_utf8(b.to_vec()) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Message::Close(_) => {
                    tracing::debug!("WebSocket closed by remote");
                    break;
                }
                _ => continue,
            };

            let json: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse CDP message as JSON");
                    continue;
                }
            };

            if let Some(id) = json.get("id").and_then(|v| v.as_u64()) {
                let response = CdpResponse {
                    id,
                    result: json.get("result").cloned(),
                    error: json
                        .get("error")
                        .and_then(|e| serde_json::from_value(e.clone()).ok()),
                };

                let mut pending_guard = pending.lock().await;
                if let Some(tx) = pending_guard.remove(&id) {
                    let _ = tx.send(response);
                } else {
                    tracing::trace!(id = id, "received response for unknown command ID");
                }
            } else if let Some(method) = json.get("method").and_then(|v| v.as_str()) {
                let params = json.get("params").cloned().unwrap_or(Value::Null);
                // If nobody is subscribed, dropping the event is fine.
                let _ = event_tx.send(CdpEvent {
                    method: method.to_string(),
                    params,
                });
            }
        }

        // Clean up: cancel all pending commands when the connection drops.
        let mut pending_guard = pending.lock().await;
        for (id, tx) in pending_guard.drain() {
            let _ = tx.send(CdpResponse {
                id,
                result: None,
                error: Some(CdpResponseError {
                    code: -1,
                    message: "WebSocket connection closed".to_string(),
                    data: None,
                }),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// CDP protocol helpers
// ---------------------------------------------------------------------------

/// Build a CDP JSON-RPC message (used in tests for validation).
pub fn build_cdp_message(id: u64, method: &str, params: Value) -> Value {
    serde_json::json!({
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Parse a CDP response JSON into its components.
pub fn parse_cdp_response(json: &Value) -> Option<CdpResponse> {
    let id = json.get("id")?.as_u64()?;
    Some(CdpResponse {
        id,
        result: json.get("result").cloned(),
        error: json
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

/// Parse a CDP event JSON into its components.
pub fn parse_cdp_event(json: &Value) -> Option<CdpEvent> {
    // Events have a `method` field but no `id`.
    if json.get("id").is_some() {
        return None;
    }
    let method = json.get("method")?.as_str()?.to_string();
    let params = json.get("params").cloned().unwrap_or(Value::Null);
    Some(CdpEvent { method, params })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
