//! Strategy registry and dispatch.

use std::fmt;

use tracing::debug;

use crate::capture::CameraCaptureEvent;
use crate::context::SessionContext;
use crate::error::{AnalysisError, Result};
use crate::options::AnalysisOptions;
use crate::strategy::{CaptureDetectionStrategy, DefaultCaptureStrategy};
use crate::vendor::{KakaoTalkStrategy, SamsungCameraStrategy};

/// Routes each session to exactly one capture strategy.
///
/// Vendor strategies are consulted by descending priority; the first whose
/// package pattern is a case-insensitive substring of the session package
/// wins. Otherwise the default strategy handles the session.
pub struct CameraCaptureDetector {
    vendors: Vec<Box<dyn CaptureDetectionStrategy>>,
    default: Box<dyn CaptureDetectionStrategy>,
}

impl fmt::Debug for CameraCaptureDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vendors: Vec<&str> = self.vendors.iter().map(|s| s.name()).collect();
        f.debug_struct("CameraCaptureDetector")
            .field("vendors", &vendors)
            .field("default", &self.default.name())
            .finish()
    }
}

impl CameraCaptureDetector {
    /// Builds a detector. Exactly one strategy must have no package pattern.
    pub fn new(strategies: Vec<Box<dyn CaptureDetectionStrategy>>) -> Result<Self> {
        let (mut defaults, mut vendors): (Vec<_>, Vec<_>) = strategies
            .into_iter()
            .partition(|s| s.package_pattern().is_none());

        let default = match defaults.len() {
            0 => return Err(AnalysisError::MissingDefaultStrategy),
            1 => defaults.remove(0),
            _ => {
                let names = defaults.iter().map(|s| s.name()).collect();
                return Err(AnalysisError::DuplicateDefaultStrategy(names));
            }
        };

        // Stable, so equal priorities keep registration order
        vendors.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        Ok(Self { vendors, default })
    }

    /// Picks the strategy for a package.
    pub fn select_strategy(&self, package: &str) -> &dyn CaptureDetectionStrategy {
        let package = package.to_lowercase();
        let chosen = self
            .vendors
            .iter()
            .find(|s| {
                s.package_pattern()
                    .is_some_and(|p| package.contains(&p.to_lowercase()))
            })
            .unwrap_or(&self.default);
        &**chosen
    }

    /// Delegates capture detection to the selected strategy.
    pub fn detect_captures(
        &self,
        context: &SessionContext<'_>,
        options: &AnalysisOptions,
    ) -> Vec<CameraCaptureEvent> {
        let strategy = self.select_strategy(context.package_name());
        debug!(
            session = %context.session.id,
            strategy = strategy.name(),
            "detecting captures"
        );
        strategy.detect_captures(context, options)
    }
}

impl Default for CameraCaptureDetector {
    /// Built-in vendors plus the generic default.
    fn default() -> Self {
        let mut vendors: Vec<Box<dyn CaptureDetectionStrategy>> =
            vec![Box::new(SamsungCameraStrategy), Box::new(KakaoTalkStrategy)];
        vendors.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        Self {
            vendors,
            default: Box::new(DefaultCaptureStrategy),
        }
    }
}
