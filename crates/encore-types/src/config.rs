//! Session configuration loaded from `encore.toml`.
//!
//! [`SessionConfig`] is the immutable input to a reservation session: the
//! target URL, product identifier, date label, language code and the ordered
//! seat-zone keyword list (first entry is the primary choice, the rest form
//! the randomized fallback pool). The `[site]`, `[browser]` and `[limits]`
//! tables are fully defaulted so a minimal config file only names the
//! performance being targeted.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::ConfigError;

// ---------------------------------------------------------------------------
// Wait limits
// ---------------------------------------------------------------------------

/// Policy for the two loops that retry without an attempt ceiling: popup
/// detection and the outer seat-zone retry.
///
/// The default preserves the unbounded contend-until-available behavior;
/// a deadline makes the loop cancellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitLimit {
    /// Keep retrying until the resource appears.
    Unbounded,
    /// Give up once the elapsed wall-clock time exceeds the duration.
    Deadline(Duration),
}

impl WaitLimit {
    /// Build a limit from an optional seconds value (the config-file shape).
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            Some(s) => WaitLimit::Deadline(Duration::from_secs(s)),
            None => WaitLimit::Unbounded,
        }
    }

    /// The deadline, if one is set.
    pub fn deadline(&self) -> Option<Duration> {
        match self {
            WaitLimit::Unbounded => None,
            WaitLimit::Deadline(d) => Some(*d),
        }
    }
}

// ---------------------------------------------------------------------------
// Browser / limit tables
// ---------------------------------------------------------------------------

/// Browser process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Explicit browser binary; discovered from well-known paths when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    /// DevTools debugging port the launched browser listens on.
    #[serde(default = "default_debugging_port")]
    pub debugging_port: u16,
    /// Run headless. The reservation flow works either way; `login` wants a
    /// visible window.
    #[serde(default)]
    pub headless: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            binary: None,
            debugging_port: default_debugging_port(),
            headless: false,
        }
    }
}

fn default_debugging_port() -> u16 {
    9222
}

/// Optional deadlines for the otherwise-unbounded loops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Give up waiting for the seat-selection popup after this many seconds.
    #[serde(default)]
    pub popup_wait_secs: Option<u64>,
    /// Give up contending for seats after this many seconds.
    #[serde(default)]
    pub seat_retry_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Site profile
// ---------------------------------------------------------------------------

/// The concrete selectors, class markers and frame name the flow drives.
///
/// Defaults target the reservation site this driver was written for; every
/// field can be overridden from the `[site]` table when the page markup
/// shifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    /// List items holding the selectable performance dates.
    #[serde(default = "default_date_item_selector")]
    pub date_item_selector: String,
    /// List items holding the time slots shown after a date is picked.
    #[serde(default = "default_time_slot_selector")]
    pub time_slot_selector: String,
    /// Class added to a time slot to mark it active.
    #[serde(default = "default_active_slot_class")]
    pub active_slot_class: String,
    /// Global page object exposing the reservation bootstrap.
    #[serde(default = "default_reservation_service_object")]
    pub reservation_service_object: String,
    /// Product type code passed to the reservation bootstrap.
    #[serde(default = "default_prod_type_code")]
    pub prod_type_code: String,
    /// Substring identifying the seat-selection popup's URL.
    #[serde(default = "default_popup_url_fragment")]
    pub popup_url_fragment: String,
    /// Name of the content frame inside the popup.
    #[serde(default = "default_content_frame_name")]
    pub content_frame_name: String,
    /// Challenge image element.
    #[serde(default = "default_captcha_image_selector")]
    pub captcha_image_selector: String,
    /// Challenge answer input field.
    #[serde(default = "default_captcha_input_selector")]
    pub captcha_input_selector: String,
    /// Challenge submit control.
    #[serde(default = "default_captcha_submit_selector")]
    pub captcha_submit_selector: String,
    /// Control that swaps in a fresh challenge image.
    #[serde(default = "default_captcha_reload_selector")]
    pub captcha_reload_selector: String,
    /// Collapsible zone group header rows.
    #[serde(default = "default_zone_header_selector")]
    pub zone_header_selector: String,
    /// Class carried by a header row once its group is expanded.
    #[serde(default = "default_zone_expanded_class")]
    pub zone_expanded_class: String,
    /// List items naming the zones once expanded.
    #[serde(default = "default_zone_list_selector")]
    pub zone_list_selector: String,
    /// Seat shapes in the seating diagram.
    #[serde(default = "default_seat_shape_selector")]
    pub seat_shape_selector: String,
    /// Control that completes seat selection.
    #[serde(default = "default_proceed_selector")]
    pub proceed_selector: String,
    /// Class the proceed control acquires once a valid seat is held.
    #[serde(default = "default_proceed_active_class")]
    pub proceed_active_class: String,
    /// "Next" control on the payment step.
    #[serde(default = "default_payment_next_selector")]
    pub payment_next_selector: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            date_item_selector: default_date_item_selector(),
            time_slot_selector: default_time_slot_selector(),
            active_slot_class: default_active_slot_class(),
            reservation_service_object: default_reservation_service_object(),
            prod_type_code: default_prod_type_code(),
            popup_url_fragment: default_popup_url_fragment(),
            content_frame_name: default_content_frame_name(),
            captcha_image_selector: default_captcha_image_selector(),
            captcha_input_selector: default_captcha_input_selector(),
            captcha_submit_selector: default_captcha_submit_selector(),
            captcha_reload_selector: default_captcha_reload_selector(),
            zone_header_selector: default_zone_header_selector(),
            zone_expanded_class: default_zone_expanded_class(),
            zone_list_selector: default_zone_list_selector(),
            seat_shape_selector: default_seat_shape_selector(),
            proceed_selector: default_proceed_selector(),
            proceed_active_class: default_proceed_active_class(),
            payment_next_selector: default_payment_next_selector(),
        }
    }
}

fn default_date_item_selector() -> String {
    "li.item_date".to_string()
}
fn default_time_slot_selector() -> String {
    "li.item_time".to_string()
}
fn default_active_slot_class() -> String {
    "on".to_string()
}
fn default_reservation_service_object() -> String {
    "ProductServiceApp".to_string()
}
fn default_prod_type_code() -> String {
    "PT0001".to_string()
}
fn default_popup_url_fragment() -> String {
    "onestop.htm".to_string()
}
fn default_content_frame_name() -> String {
    "oneStopFrame".to_string()
}
fn default_captcha_image_selector() -> String {
    "#captchaImg".to_string()
}
fn default_captcha_input_selector() -> String {
    "#label-for-captcha".to_string()
}
fn default_captcha_submit_selector() -> String {
    "#btnComplete".to_string()
}
fn default_captcha_reload_selector() -> String {
    "#btnReload".to_string()
}
fn default_zone_header_selector() -> String {
    "tr[id^=\"gd\"]".to_string()
}
fn default_zone_expanded_class() -> String {
    "expanded".to_string()
}
fn default_zone_list_selector() -> String {
    ".list_area li".to_string()
}
fn default_seat_shape_selector() -> String {
    "rect".to_string()
}
fn default_proceed_selector() -> String {
    "#nextTicketSelection".to_string()
}
fn default_proceed_active_class() -> String {
    "btnOneB".to_string()
}
fn default_payment_next_selector() -> String {
    "#nextPayment".to_string()
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Immutable input describing one reservation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Performance page URL to open first.
    pub target_url: String,
    /// Product identifier passed to the reservation bootstrap.
    pub product_id: String,
    /// Free-text label matched against the displayed date controls,
    /// e.g. `"May 24"`.
    pub target_date: String,
    /// Language code passed to the reservation bootstrap.
    #[serde(default = "default_language")]
    pub language: String,
    /// Ordered seat-zone keywords. The first entry is tried initially; the
    /// remainder is the fallback pool drawn from at random while contending.
    pub seat_keywords: Vec<String>,
    /// Login form URL used by the `login` command.
    #[serde(default)]
    pub login_url: Option<String>,
    /// Cookie jar written by `login` and loaded by `run`.
    #[serde(default = "default_cookie_jar")]
    pub cookie_jar: PathBuf,
    /// Directory for post-mortem artifacts (challenge captures, dumps).
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub limits: LimitSettings,
    #[serde(default)]
    pub site: SiteProfile,
}

fn default_language() -> String {
    "EN".to_string()
}
fn default_cookie_jar() -> PathBuf {
    PathBuf::from("encore_cookies.json")
}
fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

impl SessionConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            what: "session config",
            detail: e.to_string(),
        })
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            what: "session config",
            detail: e.to_string(),
        })
    }

    /// Load and validate a configuration file.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level requirements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = Url::parse(&self.target_url)
            .map_err(|e| ConfigError::Invalid(format!("target_url: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "target_url scheme '{other}' is not allowed; only http and https are permitted"
                )));
            }
        }
        if self.product_id.trim().is_empty() {
            return Err(ConfigError::Invalid("product_id is empty".to_string()));
        }
        if self.target_date.trim().is_empty() {
            return Err(ConfigError::Invalid("target_date is empty".to_string()));
        }
        if self.seat_keywords.is_empty() {
            return Err(ConfigError::Invalid(
                "seat_keywords must name at least one zone".to_string(),
            ));
        }
        if self.seat_keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "seat_keywords must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }

    /// Keywords eligible for the randomized retry after the primary zone
    /// fails. The primary has already been tried, so it is excluded unless
    /// it is the only keyword configured.
    pub fn fallback_zone_pool(&self) -> &[String] {
        if self.seat_keywords.len() > 1 {
            &self.seat_keywords[1..]
        } else {
            &self.seat_keywords[..]
        }
    }

    /// Wait-limit policy for popup detection.
    pub fn popup_wait_limit(&self) -> WaitLimit {
        WaitLimit::from_secs(self.limits.popup_wait_secs)
    }

    /// Wait-limit policy for the outer seat-zone retry.
    pub fn seat_retry_limit(&self) -> WaitLimit {
        WaitLimit::from_secs(self.limits.seat_retry_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            target_url = "https://tickets.example.com/performance/index.htm?prodId=211217"
            product_id = "211217"
            target_date = "May 24"
            seat_keywords = ["207", "407", "311", "403"]
        "#
    }

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config = SessionConfig::from_toml(minimal_toml()).unwrap();
        assert_eq!(config.language, "EN");
        assert_eq!(config.site.content_frame_name, "oneStopFrame");
        assert_eq!(config.site.popup_url_fragment, "onestop.htm");
        assert_eq!(config.browser.debugging_port, 9222);
        assert!(!config.browser.headless);
        assert_eq!(config.limits.popup_wait_secs, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_site_table_overrides_single_field() {
        let toml = format!("{}\n[site]\ncontent_frame_name = \"bookingFrame\"\n", minimal_toml());
        let config = SessionConfig::from_toml(&toml).unwrap();
        assert_eq!(config.site.content_frame_name, "bookingFrame");
        // Untouched fields keep their defaults.
        assert_eq!(config.site.captcha_image_selector, "#captchaImg");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = SessionConfig::from_toml(minimal_toml()).unwrap();
        let serialized = config.to_toml().unwrap();
        let back = SessionConfig::from_toml(&serialized).unwrap();
        assert_eq!(back.target_date, "May 24");
        assert_eq!(back.seat_keywords, config.seat_keywords);
    }

    #[test]
    fn test_validate_rejects_bad_inputs() {
        let mut config = SessionConfig::from_toml(minimal_toml()).unwrap();
        config.target_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::from_toml(minimal_toml()).unwrap();
        config.target_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::from_toml(minimal_toml()).unwrap();
        config.product_id = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::from_toml(minimal_toml()).unwrap();
        config.seat_keywords.clear();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::from_toml(minimal_toml()).unwrap();
        config.seat_keywords = vec!["207".to_string(), "".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_pool_excludes_primary() {
        let config = SessionConfig::from_toml(minimal_toml()).unwrap();
        let pool = config.fallback_zone_pool();
        assert_eq!(pool, &["407", "311", "403"]);
        assert!(!pool.contains(&"207".to_string()));
    }

    #[test]
    fn test_fallback_pool_degenerates_to_single_keyword() {
        let mut config = SessionConfig::from_toml(minimal_toml()).unwrap();
        config.seat_keywords = vec!["207".to_string()];
        assert_eq!(config.fallback_zone_pool(), &["207"]);
    }

    #[test]
    fn test_wait_limits_from_config() {
        let toml = format!("{}\n[limits]\npopup_wait_secs = 600\n", minimal_toml());
        let config = SessionConfig::from_toml(&toml).unwrap();
        assert_eq!(
            config.popup_wait_limit(),
            WaitLimit::Deadline(Duration::from_secs(600))
        );
        assert_eq!(config.seat_retry_limit(), WaitLimit::Unbounded);
    }

    #[test]
    fn test_wait_limit_deadline_accessor() {
        assert_eq!(WaitLimit::Unbounded.deadline(), None);
        assert_eq!(
            WaitLimit::Deadline(Duration::from_secs(5)).deadline(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(WaitLimit::from_secs(None), WaitLimit::Unbounded);
    }
}
