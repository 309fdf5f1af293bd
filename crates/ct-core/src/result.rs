//! Output of one analysis run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capture::CameraCaptureEvent;
use crate::dedup::DeduplicationInfo;
use crate::event::NormalizedLogEvent;
use crate::session::CameraSession;

/// Aggregate counts and timing for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStatistics {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub total_events: usize,
    pub unrecognized_events: usize,
    pub session_count: usize,
    pub incomplete_session_count: usize,
    pub capture_count: usize,
    pub estimated_capture_count: usize,
    pub duplicates_removed: usize,
}

/// Sessions, captures and diagnostics of a run.
///
/// Errors and warnings are informational strings, not raised faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub sessions: Vec<CameraSession>,
    pub captures: Vec<CameraCaptureEvent>,
    pub source_events: Vec<NormalizedLogEvent>,
    pub deduplications: Vec<DeduplicationInfo>,
    pub statistics: AnalysisStatistics,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Captures belonging to one session, in capture order.
    pub fn captures_for<'a>(
        &'a self,
        session: &'a CameraSession,
    ) -> impl Iterator<Item = &'a CameraCaptureEvent> {
        self.captures
            .iter()
            .filter(move |c| c.parent_session_id == session.id)
    }
}

/// Pipeline stage reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    DetectingSessions,
    AnalyzingSessions,
    Deduplicating,
    Complete,
}

/// A progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisProgress {
    pub stage: AnalysisStage,
    pub completed: usize,
    pub total: usize,
}
