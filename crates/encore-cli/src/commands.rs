//! The `run` and `login` commands.

use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use tokio::io::AsyncBufReadExt;

use encore_browser::{LaunchOptions, LaunchedBrowser};
use encore_flow::{ArtifactSink, ReservationSession};
use encore_types::{load_jar, save_jar, SessionConfig};
use encore_vision::TesseractBackend;

const LOGIN_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

fn launch_options(config: &SessionConfig, headless_override: Option<bool>) -> LaunchOptions {
    LaunchOptions {
        binary: config.browser.binary.clone(),
        debugging_port: config.browser.debugging_port,
        headless: headless_override.unwrap_or(config.browser.headless),
    }
}

/// Run one reservation session to completion or first failure.
pub async fn run(config: &SessionConfig) -> anyhow::Result<()> {
    // A missing or stale jar is not an error: the session simply behaves
    // as an unauthenticated user.
    let cookies = match load_jar(&config.cookie_jar) {
        Ok(jar) => {
            let now = Utc::now();
            let expired = jar.iter().filter(|c| c.is_expired(now)).count();
            if expired > 0 {
                tracing::warn!(expired, total = jar.len(), "cookie jar contains expired cookies");
            }
            tracing::info!(count = jar.len(), path = %config.cookie_jar.display(), "cookie jar loaded");
            jar
        }
        Err(err) => {
            tracing::warn!(
                path = %config.cookie_jar.display(),
                error = %err,
                "no usable cookie jar; the session will run unauthenticated"
            );
            Vec::new()
        }
    };

    let artifacts = ArtifactSink::new(&config.artifacts_dir)
        .with_context(|| format!("creating artifacts dir {}", config.artifacts_dir.display()))?;
    let recognizer = TesseractBackend::default();

    let browser = LaunchedBrowser::launch(launch_options(config, None))
        .await
        .context("launching browser")?;

    let report = ReservationSession::new(&browser, config)
        .run(&recognizer, &cookies, Some(&artifacts))
        .await;

    if report.success {
        tracing::info!(session = %report.session_id, "session finished successfully");
        Ok(())
    } else {
        bail!(
            "session {} stopped at stage '{}'",
            report.session_id,
            report.failed_stage.unwrap_or("unknown")
        );
    }
}

/// Open the login form, let the operator log in manually, then persist the
/// browser's cookies for later `run` invocations.
pub async fn login(config: &SessionConfig) -> anyhow::Result<()> {
    let Some(login_url) = config.login_url.as_deref() else {
        bail!("login_url is not set in the configuration");
    };

    // Manual login needs a visible window regardless of the run setting.
    let browser = LaunchedBrowser::launch(launch_options(config, Some(false)))
        .await
        .context("launching browser")?;
    let page = browser.attach_first_page().await.context("attaching page")?;
    page.navigate(login_url, LOGIN_NAVIGATION_TIMEOUT)
        .await
        .context("opening login form")?;

    println!("Log in in the browser window, then press Enter here to capture the cookies.");
    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("waiting for confirmation")?;

    let jar = page.get_all_cookies().await.context("reading cookies")?;
    save_jar(&config.cookie_jar, &jar)
        .with_context(|| format!("writing {}", config.cookie_jar.display()))?;
    tracing::info!(
        count = jar.len(),
        path = %config.cookie_jar.display(),
        "cookie jar saved"
    );

    browser.kill();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig::from_toml(
            r#"
                target_url = "https://tickets.example.com/performance"
                product_id = "211217"
                target_date = "May 24"
                seat_keywords = ["207"]

                [browser]
                headless = true
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_launch_options_follow_config() {
        let options = launch_options(&config(), None);
        assert!(options.headless);
        assert_eq!(options.debugging_port, 9222);
        assert!(options.binary.is_none());
    }

    #[test]
    fn test_login_forces_a_visible_window() {
        let options = launch_options(&config(), Some(false));
        assert!(!options.headless);
    }
}
