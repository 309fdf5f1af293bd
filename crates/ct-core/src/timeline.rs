//! Chronological display sequence for sessions and captures.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AnalysisResult;
use crate::types::Confidence;

/// Lower bound of the green band.
pub const GREEN_THRESHOLD: f32 = 0.8;
/// Lower bound of the yellow band.
pub const YELLOW_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineKind {
    /// Interval; declared first so sessions sort before captures on ties.
    Session,
    /// Instant.
    Capture,
}

/// Coarse score classification for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineColor {
    Green,
    Yellow,
    Red,
}

impl TimelineColor {
    pub fn from_score(score: Confidence) -> Self {
        let value = score.value();
        if value >= GREEN_THRESHOLD {
            Self::Green
        } else if value >= YELLOW_THRESHOLD {
            Self::Yellow
        } else {
            Self::Red
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for TimelineColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub kind: TimelineKind,
    pub start: DateTime<Utc>,
    /// Absent for captures and for open sessions.
    pub end: Option<DateTime<Utc>>,
    pub label: String,
    pub package_name: String,
    pub confidence: Confidence,
    pub color: TimelineColor,
    /// Owning session of a capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Incomplete session or estimated capture.
    pub flagged: bool,
}

impl fmt::Display for TimelineItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const TIME: &str = "%Y-%m-%d %H:%M:%S";
        let start = self.start.format(TIME);
        let span = match (self.kind, self.end) {
            (TimelineKind::Capture, _) => start.to_string(),
            (TimelineKind::Session, Some(end)) => format!("{start} -> {}", end.format(TIME)),
            (TimelineKind::Session, None) => format!("{start} -> open"),
        };
        write!(f, "{span:<42}  {:<6}  {}", self.color, self.label)
    }
}

/// Merges sessions and captures into one ascending sequence.
pub fn build_timeline(result: &AnalysisResult) -> Vec<TimelineItem> {
    let sessions = result.sessions.iter().map(|s| TimelineItem {
        id: s.id.to_string(),
        kind: TimelineKind::Session,
        start: s.start_time,
        end: s.end_time,
        label: String::new(),
        package_name: s.package_name.clone(),
        confidence: s.confidence,
        color: TimelineColor::from_score(s.confidence),
        parent_id: None,
        flagged: s.is_incomplete(),
    });
    let captures = result.captures.iter().map(|c| TimelineItem {
        id: c.id.to_string(),
        kind: TimelineKind::Capture,
        start: c.capture_time,
        end: None,
        label: String::new(),
        package_name: c.package_name.clone(),
        confidence: c.confidence,
        color: TimelineColor::from_score(c.confidence),
        parent_id: Some(c.parent_session_id.to_string()),
        flagged: c.is_estimated,
    });

    let mut items: Vec<TimelineItem> = sessions.chain(captures).collect();
    items.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.kind.cmp(&b.kind)));

    let (mut session_n, mut capture_n) = (0, 0);
    for item in &mut items {
        let (noun, n, suffix) = match item.kind {
            TimelineKind::Session => {
                session_n += 1;
                ("Session", session_n, " (incomplete)")
            }
            TimelineKind::Capture => {
                capture_n += 1;
                ("Capture", capture_n, " (estimated)")
            }
        };
        let suffix = if item.flagged { suffix } else { "" };
        item.label = format!("{noun} {n}: {}{suffix}", item.package_name);
    }
    items
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use insta::assert_snapshot;
    use uuid::Uuid;

    use super::*;
    use crate::capture::CameraCaptureEvent;
    use crate::event_type::EventType;
    use crate::fixtures::{CAMERA_PKG, at, t0};
    use crate::result::AnalysisStatistics;
    use crate::session::{CameraSession, IncompleteReason};
    use crate::types::{CaptureId, SessionId};

    fn session(id: &str, package: &str, start: i64, end: Option<i64>, score: f32) -> CameraSession {
        CameraSession {
            id: SessionId::new(id).unwrap(),
            start_time: at(start),
            end_time: end.map(at),
            package_name: package.to_string(),
            process_id: None,
            source_log_types: BTreeSet::new(),
            capture_event_ids: Vec::new(),
            start_event_id: None,
            end_event_id: None,
            incomplete_reason: end.is_none().then_some(IncompleteReason::MissingEnd),
            confidence: Confidence::clamped(score),
            source_event_ids: Vec::new(),
        }
    }

    fn capture(id: &str, session: &CameraSession, secs: i64, score: f32, estimated: bool) -> CameraCaptureEvent {
        CameraCaptureEvent {
            id: CaptureId::new(id).unwrap(),
            parent_session_id: session.id.clone(),
            capture_time: at(secs),
            package_name: session.package_name.clone(),
            file_path: None,
            decisive_evidence_id: None,
            supporting_evidence_ids: Vec::new(),
            is_estimated: estimated,
            confidence: Confidence::clamped(score),
            evidence_types: vec![EventType::DatabaseInsert],
            source_event_ids: Vec::new(),
            metadata: BTreeMap::new(),
            transmission_detected: None,
            transmission_packets: None,
        }
    }

    fn result(sessions: Vec<CameraSession>, captures: Vec<CameraCaptureEvent>) -> AnalysisResult {
        AnalysisResult {
            success: true,
            statistics: AnalysisStatistics {
                run_id: Uuid::nil(),
                started_at: t0(),
                elapsed_ms: 0,
                total_events: 0,
                unrecognized_events: 0,
                session_count: sessions.len(),
                incomplete_session_count: 0,
                capture_count: captures.len(),
                estimated_capture_count: 0,
                duplicates_removed: 0,
            },
            sessions,
            captures,
            source_events: Vec::new(),
            deduplications: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn color_bands() {
        assert_eq!(TimelineColor::from_score(Confidence::clamped(0.8)), TimelineColor::Green);
        assert_eq!(TimelineColor::from_score(Confidence::clamped(0.79)), TimelineColor::Yellow);
        assert_eq!(TimelineColor::from_score(Confidence::clamped(0.5)), TimelineColor::Yellow);
        assert_eq!(TimelineColor::from_score(Confidence::clamped(0.49)), TimelineColor::Red);
    }

    #[test]
    fn empty_result_yields_empty_timeline() {
        assert!(build_timeline(&result(Vec::new(), Vec::new())).is_empty());
    }

    #[test]
    fn session_sorts_before_capture_at_same_instant() {
        let s = session("session-1", CAMERA_PKG, 0, Some(60), 1.0);
        let c = capture("session-1-capture-1", &s, 0, 0.9, false);
        let items = build_timeline(&result(vec![s], vec![c]));

        assert_eq!(items[0].kind, TimelineKind::Session);
        assert_eq!(items[1].kind, TimelineKind::Capture);
        assert_eq!(items[1].parent_id.as_deref(), Some("session-1"));
    }

    #[test]
    fn open_session_has_no_end() {
        let s = session("session-1", CAMERA_PKG, 0, None, 0.5);
        let items = build_timeline(&result(vec![s], Vec::new()));

        assert_eq!(items[0].end, None);
        assert!(items[0].flagged);
        assert!(items[0].label.ends_with("(incomplete)"));
    }

    #[test]
    fn renders_mixed_timeline() {
        let s1 = session("session-1", CAMERA_PKG, 0, Some(300), 0.85);
        let s2 = session("session-2", "com.other.cam", 400, None, 0.5);
        let captures = vec![
            capture("session-1-capture-1", &s1, 30, 0.5, false),
            capture("session-1-capture-2", &s1, 95, 1.0, false),
            capture("session-2-capture-1", &s2, 410, 0.3, true),
        ];
        let items = build_timeline(&result(vec![s1, s2], captures));

        let output = items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        assert_snapshot!(output, @r"
        2024-05-01 10:00:00 -> 2024-05-01 10:05:00  green   Session 1: com.android.camera2
        2024-05-01 10:00:30                         yellow  Capture 1: com.android.camera2
        2024-05-01 10:01:35                         green   Capture 2: com.android.camera2
        2024-05-01 10:06:40 -> open                 yellow  Session 2: com.other.cam (incomplete)
        2024-05-01 10:06:50                         red     Capture 3: com.other.cam (estimated)
        ");
    }
}
