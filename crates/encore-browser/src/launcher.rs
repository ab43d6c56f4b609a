//! Chrome/Chromium discovery, launch, and DevTools target enumeration.
//!
//! The launcher finds an installed Chrome-family binary from well-known
//! per-platform paths, starts it with a remote debugging port and a
//! throwaway profile, then polls the DevTools HTTP endpoint until it
//! answers. Target enumeration (`/json/list`) is also how the popup
//! locator observes windows the page opens out of band.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use serde::Deserialize;
use tempfile::TempDir;

use crate::error::BrowserError;
use crate::page::PageDriver;

// ---------------------------------------------------------------------------
// Target metadata
// ---------------------------------------------------------------------------

/// One DevTools target as reported by `/json/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: Option<String>,
}

impl TargetInfo {
    /// Whether this target is a regular page (window or tab).
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

// ---------------------------------------------------------------------------
// Binary discovery
// ---------------------------------------------------------------------------

/// Well-known Chrome/Chromium binary paths for the current platform.
pub fn platform_candidate_paths() -> &'static [&'static str] {
    #[cfg(target_os = "macos")]
    {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    }

    #[cfg(target_os = "linux")]
    {
        &[
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium-browser",
            "/usr/bin/chromium",
            "/snap/bin/chromium",
        ]
    }

    #[cfg(target_os = "windows")]
    {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        &[]
    }
}

/// Locate an installed Chrome-family binary.
pub fn discover_binary() -> Result<PathBuf, BrowserError> {
    platform_candidate_paths()
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .ok_or(BrowserError::NoChromeFound)
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// Options controlling the browser launch.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Explicit binary path; discovered when unset.
    pub binary: Option<PathBuf>,
    /// DevTools debugging port.
    pub debugging_port: u16,
    /// Run headless.
    pub headless: bool,
}

/// How long to wait for the DevTools endpoint after spawning the process.
const ENDPOINT_WAIT: Duration = Duration::from_secs(15);
const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// A launched browser process with its DevTools endpoint.
///
/// The process is killed when [`LaunchedBrowser::close`] is called or when
/// the value is dropped. The throwaway profile directory is removed with it.
pub struct LaunchedBrowser {
    child: StdMutex<Option<Child>>,
    http: reqwest::Client,
    port: u16,
    _profile_dir: TempDir,
}

impl LaunchedBrowser {
    /// Launch a browser and wait for its DevTools endpoint to come up.
    pub async fn launch(options: LaunchOptions) -> Result<Self, BrowserError> {
        let binary = match &options.binary {
            Some(path) => path.clone(),
            None => discover_binary()?,
        };

        let profile_dir = TempDir::new().map_err(|e| BrowserError::LaunchFailed {
            reason: format!("failed to create profile dir: {e}"),
        })?;

        let mut cmd = Command::new(&binary);
        cmd.arg(format!("--remote-debugging-port={}", options.debugging_port))
            .arg(format!("--user-data-dir={}", profile_dir.path().display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--start-maximized")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if options.headless {
            cmd.arg("--headless=new").arg("--disable-gpu");
        }

        tracing::info!(binary = %binary.display(), port = options.debugging_port, "launching browser");

        let child = cmd.spawn().map_err(|e| BrowserError::LaunchFailed {
            reason: format!("failed to spawn {}: {e}", binary.display()),
        })?;

        let browser = Self {
            child: StdMutex::new(Some(child)),
            http: reqwest::Client::new(),
            port: options.debugging_port,
            _profile_dir: profile_dir,
        };

        browser.wait_for_endpoint().await?;
        Ok(browser)
    }

    /// Poll `/json/version` until the DevTools endpoint answers.
    async fn wait_for_endpoint(&self) -> Result<(), BrowserError> {
        let url = format!("http://127.0.0.1:{}/json/version", self.port);
        let deadline = tokio::time::Instant::now() + ENDPOINT_WAIT;

        loop {
            match self.http.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(port = self.port, "DevTools endpoint is up");
                    return Ok(());
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                self.kill();
                return Err(BrowserError::LaunchFailed {
                    reason: format!(
                        "DevTools endpoint did not answer within {ENDPOINT_WAIT:?} on port {}",
                        self.port
                    ),
                });
            }
            tokio::time::sleep(ENDPOINT_POLL_INTERVAL).await;
        }
    }

    /// Enumerate all DevTools targets.
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>, BrowserError> {
        let url = format!("http://127.0.0.1:{}/json/list", self.port);
        let targets = self
            .http
            .get(&url)
            .send()
            .await?
            .json::<Vec<TargetInfo>>()
            .await?;
        Ok(targets)
    }

    /// Attach a page driver to a target.
    pub async fn attach(&self, target: &TargetInfo) -> Result<PageDriver, BrowserError> {
        let ws_url = target
            .ws_url
            .as_deref()
            .ok_or_else(|| BrowserError::TargetNotAttachable {
                id: target.id.clone(),
                url: target.url.clone(),
            })?;
        PageDriver::connect(ws_url).await
    }

    /// Attach to the first regular page target (the browser's initial tab).
    pub async fn attach_first_page(&self) -> Result<PageDriver, BrowserError> {
        let targets = self.list_targets().await?;
        let target = targets
            .iter()
            .find(|t| t.is_page())
            .ok_or_else(|| BrowserError::LaunchFailed {
                reason: "browser exposes no page target".to_string(),
            })?;
        self.attach(target).await
    }

    /// Attach to the first page target whose URL contains `fragment`, if one
    /// exists right now. This is one probe of the popup-detection loop.
    pub async fn attach_matching(
        &self,
        fragment: &str,
    ) -> Result<Option<PageDriver>, BrowserError> {
        let targets = self.list_targets().await?;
        let Some(target) = targets.iter().find(|t| t.is_page() && t.url.contains(fragment)) else {
            return Ok(None);
        };
        tracing::debug!(url = %target.url, "found matching target");
        Ok(Some(self.attach(target).await?))
    }

    /// Kill the browser process.
    pub fn kill(&self) {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                if let Err(e) = child.kill() {
                    tracing::debug!(error = %e, "browser process already gone");
                }
                let _ = child.wait();
                tracing::info!("browser process released");
            }
        }
    }
}

impl Drop for LaunchedBrowser {
    fn drop(&mut self) {
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
    fn test_target_info_deserializes_devtools_shape() {
        let json = r#"{
            "description": "",
            "devtoolsFrontendUrl": "/devtools/inspector.html?ws=...",
            "id": "AB12",
            "title": "Ticketing",
            "type": "page",
            "url": "https://tickets.example.com/onestop.htm",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/AB12"
        }"#;
        let target: TargetInfo = serde_json::from_str(json).unwrap();
        assert!(target.is_page());
        assert_eq!(target.id, "AB12");
        assert!(target.url.contains("onestop.htm"));
        assert!(target.ws_url.is_some());
    }

    #[test]
    fn test_target_info_tolerates_missing_ws_url() {
        let json = r#"{
            "id": "CD34",
            "type": "background_page",
            "url": "chrome-extension://something"
        }"#;
        let target: TargetInfo = serde_json::from_str(json).unwrap();
        assert!(!target.is_page());
        assert!(target.ws_url.is_none());
        assert_eq!(target.title, "");
    }

    #[test]
    fn test_platform_has_candidate_paths() {
        // Every supported platform ships a non-empty candidate list; the
        // discovery error path is only reachable when none exist on disk.
        assert!(!platform_candidate_paths().is_empty());
    }
}
