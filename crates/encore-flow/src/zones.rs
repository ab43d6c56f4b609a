//! Expanding collapsed seat-zone groups and selecting one by keyword.
//!
//! Both operations run inside the popup's content frame, which is
//! re-resolved by name on every call; a missing frame means the popup is
//! not on the step we think it is and the stage reports failure.

use std::time::Duration;

use encore_types::SiteProfile;

use crate::script;
use crate::ui::{value_is_true, PageOps};
use crate::FlowError;

/// Tunables for zone expansion.
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    /// Spacing between scheduled header clicks, to avoid overwhelming the
    /// page's own expand handlers.
    pub header_stagger: Duration,
    /// Base settle time added on top of the per-header spacing.
    pub base_settle: Duration,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            header_stagger: Duration::from_millis(150),
            base_settle: Duration::from_millis(800),
        }
    }
}

/// Expands every collapsed zone group in the content frame.
pub struct ZoneExpander<'a, U: PageOps> {
    page: &'a U,
    profile: &'a SiteProfile,
    config: ZoneConfig,
}

impl<'a, U: PageOps> ZoneExpander<'a, U> {
    pub fn new(page: &'a U, profile: &'a SiteProfile) -> Self {
        Self {
            page,
            profile,
            config: ZoneConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ZoneConfig) -> Self {
        self.config = config;
        self
    }

    /// Schedule a staggered click on every collapsed group header, then wait
    /// a settle time proportional to how many were scheduled. The wait is a
    /// heuristic; the page offers no completion signal for its expand
    /// animations.
    pub async fn expand(&self) -> Result<bool, FlowError> {
        let frame_name = self.profile.content_frame_name.as_str();
        let Some(frame) = self.page.frame_by_name(frame_name).await? else {
            tracing::error!(frame = frame_name, "cannot find content frame");
            return Ok(false);
        };

        let expr = script::zone_expand(
            &self.profile.zone_header_selector,
            &self.profile.zone_expanded_class,
            self.config.header_stagger.as_millis() as u64,
        );
        let value = self.page.eval_in_frame(&frame, &expr).await?;
        let count = value.as_u64().ok_or_else(|| FlowError::UnexpectedValue {
            detail: format!("zone expansion returned {value}"),
        })?;

        let settle = self.config.base_settle + self.config.header_stagger * (count as u32);
        tracing::info!(count, ?settle, "zone groups scheduled for expansion");
        tokio::time::sleep(settle).await;

        Ok(true)
    }
}

/// Selects a zone list item by keyword substring.
pub struct ZoneSelector<'a, U: PageOps> {
    page: &'a U,
    profile: &'a SiteProfile,
}

impl<'a, U: PageOps> ZoneSelector<'a, U> {
    pub fn new(page: &'a U, profile: &'a SiteProfile) -> Self {
        Self { page, profile }
    }

    /// Click the first visible list item whose text contains `keyword`.
    /// Returns whether a match was clicked; the caller decides how to react
    /// to a miss.
    pub async fn select(&self, keyword: &str) -> Result<bool, FlowError> {
        let frame_name = self.profile.content_frame_name.as_str();
        let Some(frame) = self.page.frame_by_name(frame_name).await? else {
            tracing::error!(frame = frame_name, "cannot find content frame");
            return Ok(false);
        };

        let expr = script::zone_select(&self.profile.zone_list_selector, keyword);
        let clicked = value_is_true(&self.page.eval_in_frame(&frame, &expr).await?);

        if clicked {
            tracing::info!(keyword, "zone selected");
        } else {
            tracing::warn!(keyword, "no zone matched the keyword");
        }
        Ok(clicked)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{frame_fixture, PageCall, ScriptedPage};

    fn profile() -> SiteProfile {
        SiteProfile::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_expand_schedules_all_collapsed_headers_once() {
        let page = ScriptedPage::builder()
            .frame(Some(frame_fixture("F1", 1)))
            .eval("setTimeout", 5)
            .build();
        let profile = profile();

        let expanded = ZoneExpander::new(&page, &profile).expand().await.unwrap();
        assert!(expanded);

        // One in-frame evaluation does all the scheduling; its script
        // filters to collapsed headers and clicks each exactly once.
        assert_eq!(page.frame_eval_count("setTimeout"), 1);
        let calls = page.calls();
        let expr = calls
            .iter()
            .find_map(|c| match c {
                PageCall::FrameEval(e) => Some(e.clone()),
                _ => None,
            })
            .unwrap();
        assert!(expr.contains("classList.contains(\"expanded\")"));
        assert!(expr.contains("index * 150"));
        assert!(expr.contains("return headers.length"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expand_missing_frame_is_fatal_for_the_stage() {
        let page = ScriptedPage::builder().build();
        let profile = profile();

        let expanded = ZoneExpander::new(&page, &profile).expand().await.unwrap();
        assert!(!expanded);
        assert_eq!(page.frame_eval_count("setTimeout"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expand_rejects_non_numeric_count() {
        let page = ScriptedPage::builder()
            .frame(Some(frame_fixture("F1", 1)))
            .eval("setTimeout", "three")
            .build();
        let profile = profile();

        let result = ZoneExpander::new(&page, &profile).expand().await;
        assert!(matches!(result, Err(FlowError::UnexpectedValue { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_reports_match() {
        let page = ScriptedPage::builder()
            .frame(Some(frame_fixture("F1", 1)))
            .eval("\"207\"", true)
            .build();
        let profile = profile();

        let clicked = ZoneSelector::new(&page, &profile).select("207").await.unwrap();
        assert!(clicked);
        assert_eq!(page.frame_eval_count("includes(\"207\")"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_reports_miss_without_error() {
        let page = ScriptedPage::builder()
            .frame(Some(frame_fixture("F1", 1)))
            .eval("\"407\"", false)
            .build();
        let profile = profile();

        let clicked = ZoneSelector::new(&page, &profile).select("407").await.unwrap();
        assert!(!clicked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_missing_frame() {
        let page = ScriptedPage::builder().build();
        let profile = profile();

        let clicked = ZoneSelector::new(&page, &profile).select("207").await.unwrap();
        assert!(!clicked);
    }
}
