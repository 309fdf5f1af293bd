//! The analysis pipeline.
//!
//! # Algorithm Summary
//!
//! 1. Detect sessions across all sources
//! 2. For each session (in parallel): build its context, bounded by the next
//!    session of the same package, and run the one capture strategy selected
//!    for its package
//! 3. Collapse duplicate captures, then give every evidence event to at most
//!    one capture
//! 4. Attach surviving capture ids to their sessions and gather statistics
//!
//! A fault in one session is recorded as a warning; the others continue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use uuid::Uuid;

use crate::capture::CameraCaptureEvent;
use crate::context::{SessionContext, session_horizons};
use crate::dedup::{EventDeduplicator, enforce_evidence_exclusivity};
use crate::detector::CameraCaptureDetector;
use crate::error::{AnalysisError, Result};
use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::options::AnalysisOptions;
use crate::result::{AnalysisProgress, AnalysisResult, AnalysisStage, AnalysisStatistics};
use crate::session::CameraSession;
use crate::session_detector::SessionDetector;

/// Runs sessions, captures and deduplication over one batch of events.
#[derive(Debug)]
pub struct Analyzer {
    options: AnalysisOptions,
    sessions: SessionDetector,
    captures: CameraCaptureDetector,
    deduplicator: EventDeduplicator,
}

impl Analyzer {
    /// Creates an analyzer with the built-in sources and strategies.
    pub fn new(options: AnalysisOptions) -> Result<Self> {
        Self::with_detector(options, CameraCaptureDetector::default())
    }

    /// Creates an analyzer with a custom strategy registry.
    pub fn with_detector(options: AnalysisOptions, captures: CameraCaptureDetector) -> Result<Self> {
        validate_options(&options)?;
        Ok(Self {
            deduplicator: EventDeduplicator::from_options(&options),
            sessions: SessionDetector::default(),
            captures,
            options,
        })
    }

    pub const fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn analyze(&self, events: &[NormalizedLogEvent]) -> AnalysisResult {
        self.analyze_with_progress(events, |_| {})
    }

    /// Like [`Self::analyze`], reporting each stage and each finished session
    /// when `enable_progress_reporting` is set.
    pub fn analyze_with_progress<F>(&self, events: &[NormalizedLogEvent], progress: F) -> AnalysisResult
    where
        F: Fn(AnalysisProgress) + Sync,
    {
        let started_at = Utc::now();
        let clock = Instant::now();
        let run_id = Uuid::new_v4();
        let report = |stage, completed, total| {
            if self.options.enable_progress_reporting {
                progress(AnalysisProgress {
                    stage,
                    completed,
                    total,
                });
            }
        };

        tracing::info!(%run_id, events = events.len(), "starting analysis");
        let mut warnings = Vec::new();

        let unrecognized_events = events
            .iter()
            .filter(|e| e.event_type == EventType::Unknown)
            .count();
        if unrecognized_events > 0 {
            warnings.push(format!("{unrecognized_events} events had an unrecognized type"));
        }

        report(AnalysisStage::DetectingSessions, 0, 1);
        let sessions = self.sessions.detect_sessions(events, &self.options);
        report(AnalysisStage::DetectingSessions, 1, 1);

        let total = sessions.len();
        let horizons = session_horizons(&sessions);
        let finished = AtomicUsize::new(0);
        report(AnalysisStage::AnalyzingSessions, 0, total);
        let per_session: Vec<Result<Vec<CameraCaptureEvent>>> = sessions
            .par_iter()
            .zip(horizons.par_iter())
            .map(|(session, &horizon)| {
                let outcome = self.analyze_session(session, events, horizon);
                let done = finished.fetch_add(1, Ordering::Relaxed) + 1;
                report(AnalysisStage::AnalyzingSessions, done, total);
                outcome
            })
            .collect();

        let mut candidates = Vec::new();
        for (session, outcome) in sessions.iter().zip(per_session) {
            match outcome {
                Ok(found) => candidates.extend(found),
                Err(e) => {
                    tracing::warn!(session = %session.id, error = %e, "skipping session");
                    warnings.push(format!("session {} skipped: {e}", session.id));
                }
            }
        }

        report(AnalysisStage::Deduplicating, 0, 1);
        let proposed = candidates.len();
        let (similar_free, mut deduplications) = self.deduplicator.deduplicate(candidates);
        let (captures, exclusivity) = enforce_evidence_exclusivity(similar_free);
        deduplications.extend(exclusivity);
        let duplicates_removed = proposed - captures.len();
        report(AnalysisStage::Deduplicating, 1, 1);

        let sessions: Vec<CameraSession> = sessions
            .into_iter()
            .map(|session| {
                let ids = captures
                    .iter()
                    .filter(|c| c.parent_session_id == session.id)
                    .map(|c| c.id.clone())
                    .collect();
                session.with_capture_ids(ids)
            })
            .collect();

        let statistics = AnalysisStatistics {
            run_id,
            started_at,
            elapsed_ms: i64::try_from(clock.elapsed().as_millis()).unwrap_or(i64::MAX),
            total_events: events.len(),
            unrecognized_events,
            session_count: sessions.len(),
            incomplete_session_count: sessions.iter().filter(|s| s.is_incomplete()).count(),
            capture_count: captures.len(),
            estimated_capture_count: captures.iter().filter(|c| c.is_estimated).count(),
            duplicates_removed,
        };
        tracing::info!(
            %run_id,
            sessions = statistics.session_count,
            captures = statistics.capture_count,
            duplicates_removed,
            elapsed_ms = statistics.elapsed_ms,
            "analysis complete"
        );
        report(AnalysisStage::Complete, 1, 1);

        let errors = Vec::new();
        AnalysisResult {
            success: errors.is_empty(),
            sessions,
            captures,
            source_events: events.to_vec(),
            deduplications,
            statistics,
            errors,
            warnings,
        }
    }

    fn analyze_session(
        &self,
        session: &CameraSession,
        events: &[NormalizedLogEvent],
        horizon: Option<DateTime<Utc>>,
    ) -> Result<Vec<CameraCaptureEvent>> {
        let context = SessionContext::bounded(session, events, horizon)?;
        Ok(self.captures.detect_captures(&context, &self.options))
    }
}

fn validate_options(options: &AnalysisOptions) -> Result<()> {
    if !(0.0..=1.0).contains(&options.min_confidence_threshold) {
        return Err(AnalysisError::InvalidArgument(format!(
            "min_confidence_threshold must be within [0, 1], got {}",
            options.min_confidence_threshold
        )));
    }
    let windows = [
        ("max_session_gap_ms", options.max_session_gap_ms),
        ("event_correlation_window_ms", options.event_correlation_window_ms),
        ("dedup_time_threshold_ms", options.dedup_time_threshold_ms),
    ];
    for (name, value) in windows {
        if value < 0 {
            return Err(AnalysisError::InvalidArgument(format!(
                "{name} must not be negative, got {value}"
            )));
        }
    }
    Ok(())
}
