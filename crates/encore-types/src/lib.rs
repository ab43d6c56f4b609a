//! Shared types for the encore reservation driver.
//!
//! This crate holds everything the other crates agree on without talking to
//! a browser: the session configuration loaded from `encore.toml`, the site
//! profile (selectors and frame names the flow drives), wait-limit policies
//! for the loops that are unbounded by default, and the cookie-jar records
//! exchanged between the `login` and `run` commands.

pub mod config;
pub mod cookies;
pub mod error;

pub use config::{BrowserSettings, LimitSettings, SessionConfig, SiteProfile, WaitLimit};
pub use cookies::{load_jar, save_jar, CookieRecord};
pub use error::ConfigError;
