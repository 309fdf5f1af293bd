//! Camera usage sessions.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CaptureId, Confidence, EventId, SessionId};

/// Why a session lacks a trustworthy boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// Only the terminating marker was seen.
    MissingStart,
    /// The terminating marker never appeared.
    MissingEnd,
    /// The log begins in the middle of the session.
    LogTruncated,
    /// The device rebooted while the session was open.
    DeviceReboot,
    Unknown,
}

impl IncompleteReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingStart => "missing_start",
            Self::MissingEnd => "missing_end",
            Self::LogTruncated => "log_truncated",
            Self::DeviceReboot => "device_reboot",
            Self::Unknown => "unknown",
        }
    }

    /// True for reasons that describe an absent start boundary.
    #[must_use]
    pub const fn is_start_side(&self) -> bool {
        matches!(self, Self::MissingStart | Self::LogTruncated)
    }
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded period of camera use by one package.
///
/// Related entities are referenced by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSession {
    pub id: SessionId,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Log sections that observed this session (e.g. `usagestats`, `media.camera`).
    pub source_log_types: BTreeSet<String>,
    #[serde(default)]
    pub capture_event_ids: Vec<CaptureId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_event_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_event_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_reason: Option<IncompleteReason>,
    /// Completeness score, not a detection score.
    pub confidence: Confidence,
    #[serde(default)]
    pub source_event_ids: Vec<EventId>,
}

impl CameraSession {
    /// True when no end time is known.
    pub const fn is_incomplete(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Returns the final form of this session with its surviving captures attached.
    #[must_use]
    pub fn with_capture_ids(self, capture_event_ids: Vec<CaptureId>) -> Self {
        Self {
            capture_event_ids,
            ..self
        }
    }
}

/// A session span proposed by a single [`SessionSource`](crate::SessionSource).
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSession {
    pub package_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_event_id: Option<EventId>,
    pub end_event_id: Option<EventId>,
    pub process_id: Option<u32>,
    pub source_types: BTreeSet<String>,
    pub priority: i32,
    pub source_event_ids: Vec<EventId>,
    pub incomplete_reason: Option<IncompleteReason>,
    /// Timestamp of the latest marker folded into this span.
    pub last_seen: DateTime<Utc>,
}

impl CandidateSession {
    /// End used for overlap tests: the known end, or the last marker seen.
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end_time.unwrap_or(self.last_seen).max(self.start_time)
    }

    /// End used when intersecting spans: open spans reach `open_grace`
    /// past their last marker.
    fn reach(&self, open_grace: Duration) -> DateTime<Utc> {
        self.end_time
            .unwrap_or(self.last_seen + open_grace)
            .max(self.start_time)
    }

    /// True if both spans belong to the same package and intersect.
    pub fn overlaps(&self, other: &Self, open_grace: Duration) -> bool {
        self.package_name.eq_ignore_ascii_case(&other.package_name)
            && self.start_time <= other.reach(open_grace)
            && other.start_time <= self.reach(open_grace)
    }

    pub const fn has_both_boundaries(&self) -> bool {
        self.start_event_id.is_some() && self.end_time.is_some()
    }

    /// Records a contributing event id, keeping the list free of repeats.
    pub fn record_event(&mut self, id: &EventId, timestamp: DateTime<Utc>) {
        if !self.source_event_ids.contains(id) {
            self.source_event_ids.push(id.clone());
        }
        self.last_seen = self.last_seen.max(timestamp);
    }

    /// Recomputes the incompleteness reason from the boundaries present.
    pub fn refresh_reason(&mut self) {
        self.incomplete_reason = if self.end_time.is_none() {
            Some(
                self.incomplete_reason
                    .filter(|r| !r.is_start_side())
                    .unwrap_or(IncompleteReason::MissingEnd),
            )
        } else if self.start_event_id.is_none() {
            Some(
                self.incomplete_reason
                    .filter(IncompleteReason::is_start_side)
                    .unwrap_or(IncompleteReason::MissingStart),
            )
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::t0;

    fn candidate(start_secs: i64, end_secs: Option<i64>) -> CandidateSession {
        let start = t0() + Duration::seconds(start_secs);
        CandidateSession {
            package_name: "com.example.camera".to_string(),
            start_time: start,
            end_time: end_secs.map(|s| t0() + Duration::seconds(s)),
            start_event_id: Some(EventId::new("start").unwrap()),
            end_event_id: end_secs.map(|_| EventId::new("end").unwrap()),
            process_id: None,
            source_types: BTreeSet::from(["media.camera".to_string()]),
            priority: 50,
            source_event_ids: Vec::new(),
            incomplete_reason: None,
            last_seen: start,
        }
    }

    #[test]
    fn session_duration_and_incompleteness() {
        let session = CameraSession {
            id: SessionId::new("session-1").unwrap(),
            start_time: t0(),
            end_time: Some(t0() + Duration::minutes(5)),
            package_name: "com.example.camera".to_string(),
            process_id: None,
            source_log_types: BTreeSet::new(),
            capture_event_ids: Vec::new(),
            start_event_id: None,
            end_event_id: None,
            incomplete_reason: None,
            confidence: Confidence::MAX,
            source_event_ids: Vec::new(),
        };
        assert!(!session.is_incomplete());
        assert_eq!(session.duration(), Some(Duration::minutes(5)));

        let open = CameraSession {
            end_time: None,
            ..session
        };
        assert!(open.is_incomplete());
        assert_eq!(open.duration(), None);
    }

    #[test]
    fn open_spans_reach_grace_past_last_marker() {
        let mut open = candidate(0, None);
        open.last_seen = t0() + Duration::seconds(60);
        let grace = Duration::seconds(30);
        assert!(open.overlaps(&candidate(90, Some(120)), grace));
        assert!(!open.overlaps(&candidate(91, Some(120)), grace));
        assert!(!open.overlaps(&candidate(61, Some(90)), Duration::zero()));
    }

    #[test]
    fn overlap_requires_same_package() {
        let a = candidate(0, Some(60));
        let mut b = candidate(10, Some(20));
        b.package_name = "com.other".to_string();
        assert!(!a.overlaps(&b, Duration::zero()));
    }

    #[test]
    fn refresh_reason_tracks_boundaries() {
        let mut span = candidate(0, None);
        span.refresh_reason();
        assert_eq!(span.incomplete_reason, Some(IncompleteReason::MissingEnd));

        span.end_time = Some(t0() + Duration::seconds(10));
        span.refresh_reason();
        assert_eq!(span.incomplete_reason, None);

        span.start_event_id = None;
        span.incomplete_reason = Some(IncompleteReason::LogTruncated);
        span.refresh_reason();
        assert_eq!(span.incomplete_reason, Some(IncompleteReason::LogTruncated));
    }

    #[test]
    fn record_event_skips_repeats() {
        let mut span = candidate(0, None);
        let id = EventId::new("e1").unwrap();
        span.record_event(&id, t0() + Duration::seconds(5));
        span.record_event(&id, t0() + Duration::seconds(3));
        assert_eq!(span.source_event_ids.len(), 1);
        assert_eq!(span.last_seen, t0() + Duration::seconds(5));
    }
}
