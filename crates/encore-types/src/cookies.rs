//! Cookie-jar records shared between the `login` and `run` commands.
//!
//! The jar is a JSON array of [`CookieRecord`]s in the shape the DevTools
//! protocol reports them (camelCase field names), so a jar captured by the
//! `login` helper can be installed verbatim before navigation.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// A single persisted authentication cookie.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiry as seconds since the Unix epoch. Non-positive values mean a
    /// session cookie.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// Whether the cookie has expired as of `now`. Session cookies never
    /// report expired here; staleness on the server side is not detectable.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires {
            Some(epoch) if epoch > 0.0 => (now.timestamp() as f64) >= epoch,
            _ => false,
        }
    }
}

/// Load a cookie jar from a JSON file.
pub fn load_jar(path: &Path) -> Result<Vec<CookieRecord>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
        what: "cookie jar",
        detail: e.to_string(),
    })
}

/// Persist a cookie jar as pretty-printed JSON.
pub fn save_jar(path: &Path, cookies: &[CookieRecord]) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(cookies).map_err(|e| ConfigError::Parse {
        what: "cookie jar",
        detail: e.to_string(),
    })?;
    std::fs::write(path, json)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_cookie() -> CookieRecord {
        CookieRecord {
            name: "SESSID".to_string(),
            value: "abc123".to_string(),
            domain: ".tickets.example.com".to_string(),
            path: "/".to_string(),
            expires: Some(1_900_000_000.0),
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
        }
    }

    #[test]
    fn test_jar_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.json");

        let jar = vec![sample_cookie()];
        save_jar(&path, &jar).unwrap();
        let back = load_jar(&path).unwrap();
        assert_eq!(back, jar);
    }

    #[test]
    fn test_jar_accepts_devtools_shape() {
        // Extra fields (e.g. `session`, `size`) are ignored; missing optional
        // fields take defaults.
        let json = r#"[
            {
                "name": "token",
                "value": "v",
                "domain": "example.com",
                "path": "/",
                "expires": -1,
                "size": 7,
                "httpOnly": false,
                "secure": false,
                "session": true
            }
        ]"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.json");
        std::fs::write(&path, json).unwrap();

        let jar = load_jar(&path).unwrap();
        assert_eq!(jar.len(), 1);
        assert_eq!(jar[0].name, "token");
        assert_eq!(jar[0].expires, Some(-1.0));
        assert_eq!(jar[0].same_site, None);
    }

    #[test]
    fn test_load_jar_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_jar(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_expiry_detection() {
        let cookie = sample_cookie();
        let before = Utc.timestamp_opt(1_899_999_999, 0).unwrap();
        let after = Utc.timestamp_opt(1_900_000_001, 0).unwrap();
        assert!(!cookie.is_expired(before));
        assert!(cookie.is_expired(after));

        // Session cookies (expires <= 0 or absent) never report expired.
        let mut session = sample_cookie();
        session.expires = Some(-1.0);
        assert!(!session.is_expired(after));
        session.expires = None;
        assert!(!session.is_expired(after));
    }
}
