//! Analysis configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Immutable configuration snapshot for one analysis run.
///
/// Plain data: the engine reads it and never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Only these packages are analyzed when set.
    pub package_whitelist: Option<Vec<String>>,

    /// Packages that are never analyzed.
    pub package_blacklist: Vec<String>,

    /// A gap between consecutive same-package markers longer than this
    /// splits a session. Default: 300000 (5 minutes).
    pub max_session_gap_ms: i64,

    /// Maximum distance between a capture anchor and its supporting evidence.
    /// Default: 30000 (30 seconds).
    pub event_correlation_window_ms: i64,

    /// Score an anchorless cluster of supporting evidence must exceed to be
    /// reported as an estimated capture. Default: 0.5.
    pub min_confidence_threshold: f32,

    /// Time threshold for the generic time-based duplicate rule.
    /// Default: 200.
    pub dedup_time_threshold_ms: i64,

    /// Path substrings identifying screenshots (case-insensitive).
    pub screenshot_path_patterns: Vec<String>,

    /// Path substrings identifying downloads (case-insensitive).
    pub download_path_patterns: Vec<String>,

    /// Keep sessions with a missing boundary instead of dropping them.
    /// Default: true.
    pub enable_incomplete_session_handling: bool,

    /// Invoke the progress callback passed to the analyzer. Default: false.
    pub enable_progress_reporting: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            package_whitelist: None,
            package_blacklist: Vec::new(),
            max_session_gap_ms: 300_000,        // 5 minutes
            event_correlation_window_ms: 30_000, // 30 seconds
            min_confidence_threshold: 0.5,
            dedup_time_threshold_ms: 200,
            screenshot_path_patterns: vec![
                "screenshot".to_string(),
                "screen_capture".to_string(),
                "screencapture".to_string(),
            ],
            download_path_patterns: vec!["/download/".to_string(), "/downloads/".to_string()],
            enable_incomplete_session_handling: true,
            enable_progress_reporting: false,
        }
    }
}

impl AnalysisOptions {
    pub fn max_session_gap(&self) -> Duration {
        Duration::milliseconds(self.max_session_gap_ms)
    }

    pub fn event_correlation_window(&self) -> Duration {
        Duration::milliseconds(self.event_correlation_window_ms)
    }

    /// Returns true if `package` passes the whitelist and blacklist.
    pub fn is_package_allowed(&self, package: &str) -> bool {
        let blacklisted = self
            .package_blacklist
            .iter()
            .any(|p| p.eq_ignore_ascii_case(package));
        let whitelisted = self
            .package_whitelist
            .as_ref()
            .is_none_or(|list| list.iter().any(|p| p.eq_ignore_ascii_case(package)));
        whitelisted && !blacklisted
    }

    /// Returns the deny-list pattern `path` matches, if any.
    pub fn excluded_path_pattern(&self, path: &str) -> Option<&str> {
        let lower = path.to_ascii_lowercase();
        self.screenshot_path_patterns
            .iter()
            .chain(&self.download_path_patterns)
            .find(|pattern| !pattern.is_empty() && lower.contains(&pattern.to_ascii_lowercase()))
            .map(String::as_str)
    }
}
