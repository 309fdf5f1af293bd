//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use ct_core::AnalysisOptions;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Options handed to the analysis engine.
    #[serde(default)]
    pub analysis: AnalysisOptions,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.analysis;
        f.debug_struct("Config")
            .field("max_session_gap_ms", &a.max_session_gap_ms)
            .field("event_correlation_window_ms", &a.event_correlation_window_ms)
            .field("min_confidence_threshold", &a.min_confidence_threshold)
            .field("dedup_time_threshold_ms", &a.dedup_time_threshold_ms)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later layers win: defaults, the user config file, `config_path`, then
    /// `CT_` environment variables (`CT_ANALYSIS__MAX_SESSION_GAP_MS=60000`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(dirs_config_path().as_deref(), config_path).extract()
    }

    fn figment(config_dir: Option<&Path>, config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = config_dir {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed("CT_").split("__"))
    }
}

/// Returns the platform-specific config directory for ct.
///
/// On Linux: `~/.config/ct`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ct"))
}
