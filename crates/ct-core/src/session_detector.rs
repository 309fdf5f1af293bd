//! Session detection: merges candidate spans from every source.
//!
//! # Algorithm Summary
//!
//! 1. Ask every source for candidates and drop filtered packages
//! 2. Visit candidates by priority descending; a candidate overlapping an
//!    accepted session of the same package is folded into it, lending any
//!    boundary the accepted session lacks
//! 3. Coalesce accepted sessions that now overlap, so one package never has
//!    two concurrent sessions
//! 4. Score completeness and assign ids in chronological order

use std::cmp::Reverse;
use std::collections::BTreeSet;

use chrono::Duration;
use tracing::debug;

use crate::event::NormalizedLogEvent;
use crate::options::AnalysisOptions;
use crate::session::{CameraSession, CandidateSession};
use crate::session_source::{MediaCameraSessionSource, SessionSource, UsageStatsSessionSource};
use crate::types::{Confidence, EventId, SessionId};

/// Weight of boundary completeness in the session score.
const COMPLETENESS_WEIGHT: f32 = 0.7;

/// Weight of cross-source corroboration in the session score.
const CORROBORATION_WEIGHT: f32 = 0.3;

/// Merges candidate sessions from a priority-ordered set of sources.
pub struct SessionDetector {
    /// Sorted by priority descending.
    sources: Vec<Box<dyn SessionSource>>,
}

impl std::fmt::Debug for SessionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDetector")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for SessionDetector {
    fn default() -> Self {
        Self::new(vec![
            Box::new(UsageStatsSessionSource),
            Box::new(MediaCameraSessionSource),
        ])
    }
}

impl SessionDetector {
    pub fn new(mut sources: Vec<Box<dyn SessionSource>>) -> Self {
        sources.sort_by_key(|s| Reverse(s.priority()));
        Self { sources }
    }

    /// Detects sessions in an unordered event list.
    ///
    /// Output is sorted by start time; sessions of one package never overlap.
    pub fn detect_sessions(
        &self,
        events: &[NormalizedLogEvent],
        options: &AnalysisOptions,
    ) -> Vec<CameraSession> {
        let mut sorted: Vec<&NormalizedLogEvent> = events.iter().collect();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut candidates: Vec<CandidateSession> = self
            .sources
            .iter()
            .flat_map(|source| source.detect_sessions(&sorted, options))
            .filter(|c| {
                let allowed = options.is_package_allowed(&c.package_name);
                if !allowed {
                    debug!(package = %c.package_name, "package filtered out");
                }
                allowed
            })
            .collect();

        // Stable: equal priorities keep source order, then chronological
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.start_time.cmp(&b.start_time))
        });

        // Open spans may still be running up to one session gap after their last marker
        let open_grace = options.max_session_gap();
        let mut accepted: Vec<CandidateSession> = Vec::new();
        for candidate in candidates {
            if let Some(existing) = accepted
                .iter_mut()
                .find(|s| s.overlaps(&candidate, open_grace))
            {
                debug!(
                    package = %candidate.package_name,
                    priority = candidate.priority,
                    "folding overlapping candidate into accepted session"
                );
                absorb_candidate(existing, candidate);
            } else {
                accepted.push(candidate);
            }
        }

        let merged = coalesce(accepted, open_grace);

        let mut sessions: Vec<CandidateSession> = merged
            .into_iter()
            .filter(|s| {
                let keep =
                    options.enable_incomplete_session_handling || s.incomplete_reason.is_none();
                if !keep {
                    debug!(
                        package = %s.package_name,
                        reason = ?s.incomplete_reason,
                        "dropping incomplete session"
                    );
                }
                keep
            })
            .collect();
        sessions.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.package_name.cmp(&b.package_name))
        });

        sessions
            .into_iter()
            .enumerate()
            .map(|(idx, s)| finalize(idx, s))
            .collect()
    }
}

/// Folds a lower-priority candidate into an accepted session.
///
/// The accepted span is kept; only boundaries it lacks are borrowed.
fn absorb_candidate(accepted: &mut CandidateSession, candidate: CandidateSession) {
    if accepted.start_event_id.is_none() && candidate.start_event_id.is_some() {
        accepted.start_time = accepted.start_time.min(candidate.start_time);
        accepted.start_event_id = candidate.start_event_id;
    }
    if accepted.end_time.is_none() {
        if let Some(end) = candidate.end_time.filter(|&end| end >= accepted.start_time) {
            accepted.end_time = Some(end.max(accepted.last_seen));
            accepted.end_event_id = candidate.end_event_id;
        }
    }
    merge_provenance(accepted, candidate.source_types, candidate.source_event_ids);
    accepted.process_id = accepted.process_id.or(candidate.process_id);
    accepted.last_seen = accepted.last_seen.max(candidate.last_seen);
    accepted.refresh_reason();
}

fn merge_provenance(
    into: &mut CandidateSession,
    source_types: BTreeSet<String>,
    source_event_ids: Vec<EventId>,
) {
    into.source_types.extend(source_types);
    for id in source_event_ids {
        if !into.source_event_ids.contains(&id) {
            into.source_event_ids.push(id);
        }
    }
}

/// Unions accepted sessions that overlap after boundary borrowing.
fn coalesce(mut sessions: Vec<CandidateSession>, open_grace: Duration) -> Vec<CandidateSession> {
    sessions.sort_by(|a, b| {
        a.package_name
            .to_ascii_lowercase()
            .cmp(&b.package_name.to_ascii_lowercase())
            .then_with(|| a.start_time.cmp(&b.start_time))
    });

    let mut merged: Vec<CandidateSession> = Vec::new();
    for session in sessions {
        if let Some(last) = merged.last_mut() {
            if last.overlaps(&session, open_grace) {
                union_into(last, session);
                continue;
            }
        }
        merged.push(session);
    }
    merged
}

/// Union of two overlapping sessions of the same package; `last` starts first.
fn union_into(last: &mut CandidateSession, other: CandidateSession) {
    if last.start_event_id.is_none() && other.start_time <= last.start_time {
        last.start_event_id = other.start_event_id.clone();
    }
    last.end_time = match (last.end_time, other.end_time) {
        (Some(a), Some(b)) if b >= a => {
            last.end_event_id = other.end_event_id.clone();
            Some(b)
        }
        (Some(a), Some(_)) => Some(a),
        // Open side outlasts the known end: the session is still open
        (Some(a), None) if other.last_seen > a => {
            last.end_event_id = None;
            None
        }
        (Some(a), None) => Some(a),
        (None, Some(b)) => {
            last.end_event_id = other.end_event_id.clone();
            Some(b.max(last.last_seen))
        }
        (None, None) => None,
    };
    if other.incomplete_reason.is_some() && last.end_time.is_none() {
        last.incomplete_reason = last.incomplete_reason.or(other.incomplete_reason);
    }
    merge_provenance(last, other.source_types, other.source_event_ids);
    last.process_id = last.process_id.or(other.process_id);
    last.priority = last.priority.max(other.priority);
    last.last_seen = last.last_seen.max(other.last_seen);
    last.refresh_reason();
}

/// Completeness score: boundary completeness plus cross-source corroboration.
pub(crate) fn completeness_confidence(session: &CandidateSession) -> Confidence {
    let completeness = if session.has_both_boundaries() {
        1.0
    } else {
        0.5
    };
    #[expect(
        clippy::cast_precision_loss,
        reason = "source count is at most a handful"
    )]
    let corroboration = session.source_types.len().min(2) as f32 / 2.0;
    Confidence::clamped(COMPLETENESS_WEIGHT * completeness + CORROBORATION_WEIGHT * corroboration)
}

fn finalize(idx: usize, session: CandidateSession) -> CameraSession {
    let confidence = completeness_confidence(&session);
    let id = SessionId::new(format!("session-{}", idx + 1))
        .unwrap_or_else(|_| unreachable!("formatted session id is never empty"));
    CameraSession {
        id,
        start_time: session.start_time,
        end_time: session.end_time,
        package_name: session.package_name,
        process_id: session.process_id,
        source_log_types: session.source_types,
        capture_event_ids: Vec::new(),
        start_event_id: session.start_event_id,
        end_event_id: session.end_event_id,
        incomplete_reason: session.incomplete_reason,
        confidence,
        source_event_ids: session.source_event_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::session_horizons;
    use crate::event_type::EventType;
    use crate::fixtures::{CAMERA_PKG, at, event};
    use crate::session::IncompleteReason;

    fn detect(events: &[NormalizedLogEvent]) -> Vec<CameraSession> {
        SessionDetector::default().detect_sessions(events, &AnalysisOptions::default())
    }

    #[test]
    fn single_source_session() {
        let events = vec![
            event("c1", at(0), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("d1", at(300), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let sessions = detect(&events);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id.as_str(), "session-1");
        assert_eq!(sessions[0].source_log_types.len(), 1);
        // 0.7 * 1.0 + 0.3 * 0.5
        assert!((sessions[0].confidence.value() - 0.85).abs() < 1e-6);
    }

    #[test]
    fn overlapping_sources_merge_and_corroborate() {
        let events = vec![
            event("r1", at(0), EventType::ActivityResumed, Some(CAMERA_PKG)),
            event("c1", at(2), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("d1", at(118), EventType::CameraDisconnect, Some(CAMERA_PKG)),
            event("p1", at(120), EventType::ActivityPaused, Some(CAMERA_PKG)),
        ];
        let sessions = detect(&events);

        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        // Higher-priority usage-stats span wins
        assert_eq!(session.start_time, at(0));
        assert_eq!(session.end_time, Some(at(120)));
        assert_eq!(session.source_log_types.len(), 2);
        assert_eq!(session.source_event_ids.len(), 4);
        assert!((session.confidence.value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn lower_priority_source_fills_missing_end() {
        let events = vec![
            event("r1", at(0), EventType::ActivityResumed, Some(CAMERA_PKG)),
            event("c1", at(1), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("d1", at(90), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let sessions = detect(&events);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].start_time, at(0));
        assert_eq!(sessions[0].end_time, Some(at(90)));
        assert_eq!(sessions[0].end_event_id.as_ref().unwrap().as_str(), "d1");
        assert!(sessions[0].incomplete_reason.is_none());
    }

    #[test]
    fn lower_priority_source_fills_missing_start() {
        let events = vec![
            event("c1", at(10), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("p0", at(20), EventType::ActivityPaused, Some(CAMERA_PKG)),
            event("d1", at(25), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let sessions = detect(&events);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].start_time, at(10));
        assert_eq!(sessions[0].start_event_id.as_ref().unwrap().as_str(), "c1");
        assert_eq!(sessions[0].end_time, Some(at(20)));
        assert!(sessions[0].incomplete_reason.is_none());
    }

    #[test]
    fn open_session_is_incomplete_with_reason() {
        let events = vec![event("c1", at(0), EventType::CameraConnect, Some(CAMERA_PKG))];
        let sessions = detect(&events);

        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_incomplete());
        assert_eq!(
            sessions[0].incomplete_reason,
            Some(IncompleteReason::MissingEnd)
        );
        // 0.7 * 0.5 + 0.3 * 0.5
        assert!((sessions[0].confidence.value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn incomplete_sessions_dropped_when_handling_disabled() {
        let events = vec![
            event("c1", at(0), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("c2", at(10), EventType::CameraConnect, Some("com.other.cam")),
            event("d2", at(20), EventType::CameraDisconnect, Some("com.other.cam")),
        ];
        let options = AnalysisOptions {
            enable_incomplete_session_handling: false,
            ..AnalysisOptions::default()
        };
        let sessions = SessionDetector::default().detect_sessions(&events, &options);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].package_name, "com.other.cam");
    }

    #[test]
    fn blacklisted_packages_are_skipped() {
        let events = vec![
            event("c1", at(0), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("d1", at(5), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let options = AnalysisOptions {
            package_blacklist: vec![CAMERA_PKG.to_string()],
            ..AnalysisOptions::default()
        };
        assert!(
            SessionDetector::default()
                .detect_sessions(&events, &options)
                .is_empty()
        );
    }

    /// Same-package sessions in start order: a closed session ends before
    /// the next starts, and an open one is bounded by the next one's start.
    fn assert_exclusive(sessions: &[CameraSession]) {
        let horizons = session_horizons(sessions);
        for (i, a) in sessions.iter().enumerate() {
            let next = sessions
                .iter()
                .filter(|b| b.start_time > a.start_time && b.package_name == a.package_name)
                .min_by_key(|b| b.start_time);
            let Some(b) = next else {
                assert_eq!(horizons[i], None);
                continue;
            };
            assert_eq!(horizons[i], Some(b.start_time));
            if let Some(end) = a.end_time {
                assert!(end < b.start_time, "{} overlaps {}", a.id, b.id);
            }
        }
    }

    #[test]
    fn sessions_of_one_package_never_overlap() {
        // Usage stats sees two short visits, the camera service one long open
        let events = vec![
            event("r1", at(0), EventType::ActivityResumed, Some(CAMERA_PKG)),
            event("c1", at(1), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("p1", at(10), EventType::ActivityPaused, Some(CAMERA_PKG)),
            event("r2", at(400), EventType::ActivityResumed, Some(CAMERA_PKG)),
            event("p2", at(410), EventType::ActivityPaused, Some(CAMERA_PKG)),
            event("d1", at(405), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let sessions = detect(&events);

        assert!(sessions.len() >= 2);
        assert_exclusive(&sessions);
    }

    #[test]
    fn open_session_is_bounded_by_next_session() {
        let events = vec![
            event("c1", at(0), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("c2", at(1_000), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("d2", at(1_300), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let sessions = detect(&events);

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].end_time, None);
        assert_eq!(sessions[0].incomplete_reason, Some(IncompleteReason::MissingEnd));
        assert_eq!(sessions[1].start_time, at(1_000));
        assert_eq!(sessions[1].end_time, Some(at(1_300)));
        assert_exclusive(&sessions);
    }

    #[test]
    fn sessions_are_sorted_and_numbered() {
        let events = vec![
            event("c2", at(100), EventType::CameraConnect, Some("com.b")),
            event("d2", at(110), EventType::CameraDisconnect, Some("com.b")),
            event("c1", at(0), EventType::CameraConnect, Some("com.a")),
            event("d1", at(10), EventType::CameraDisconnect, Some("com.a")),
        ];
        let sessions = detect(&events);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].package_name, "com.a");
        assert_eq!(sessions[0].id.as_str(), "session-1");
        assert_eq!(sessions[1].package_name, "com.b");
        assert_eq!(sessions[1].id.as_str(), "session-2");
    }
}
