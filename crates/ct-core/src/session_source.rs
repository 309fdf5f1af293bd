//! Candidate session sources.
//!
//! Each source scans the normalized stream for its own boundary markers and
//! proposes spans per package. Spans from different sources are reconciled by
//! [`SessionDetector`](crate::SessionDetector).
//!
//! # Span Construction
//!
//! 1. Group marker events by package, ascending by timestamp
//! 2. A start marker opens a span; repeated start markers extend it
//! 3. An end marker closes it; a start marker shortly after reopens it
//! 4. A gap longer than `max_session_gap_ms` between markers forces a split
//! 5. A `DEVICE_BOOT` closes every open span

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::options::AnalysisOptions;
use crate::session::{CandidateSession, IncompleteReason};

/// Priority of the usage-stats source.
pub const PRIMARY_SOURCE_PRIORITY: i32 = 100;

/// Priority of the media-subsystem source.
pub const SECONDARY_SOURCE_PRIORITY: i32 = 50;

/// A producer of candidate session spans.
pub trait SessionSource: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Fixed priority; higher wins when spans overlap.
    fn priority(&self) -> i32;

    /// Proposes candidate spans. `events` must be sorted by timestamp ascending.
    fn detect_sessions(
        &self,
        events: &[&NormalizedLogEvent],
        options: &AnalysisOptions,
    ) -> Vec<CandidateSession>;
}

/// Which event types open and close a span for one source.
#[derive(Debug, Clone, Copy)]
struct MarkerVocabulary {
    source_type: &'static str,
    start: &'static [EventType],
    end: &'static [EventType],
}

/// Sessions from app lifecycle records (`ACTIVITY_RESUMED` .. `ACTIVITY_PAUSED`).
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageStatsSessionSource;

impl UsageStatsSessionSource {
    const VOCABULARY: MarkerVocabulary = MarkerVocabulary {
        source_type: "usagestats",
        start: &[EventType::ActivityResumed],
        end: &[EventType::ActivityPaused, EventType::ActivityStopped],
    };
}

impl SessionSource for UsageStatsSessionSource {
    fn name(&self) -> &'static str {
        "usagestats"
    }

    fn priority(&self) -> i32 {
        PRIMARY_SOURCE_PRIORITY
    }

    fn detect_sessions(
        &self,
        events: &[&NormalizedLogEvent],
        options: &AnalysisOptions,
    ) -> Vec<CandidateSession> {
        scan_markers(events, Self::VOCABULARY, self.priority(), options)
    }
}

/// Sessions from camera service open/close records (`CAMERA_CONNECT` .. `CAMERA_DISCONNECT`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaCameraSessionSource;

impl MediaCameraSessionSource {
    const VOCABULARY: MarkerVocabulary = MarkerVocabulary {
        source_type: "media.camera",
        start: &[EventType::CameraConnect],
        end: &[EventType::CameraDisconnect],
    };
}

impl SessionSource for MediaCameraSessionSource {
    fn name(&self) -> &'static str {
        "media.camera"
    }

    fn priority(&self) -> i32 {
        SECONDARY_SOURCE_PRIORITY
    }

    fn detect_sessions(
        &self,
        events: &[&NormalizedLogEvent],
        options: &AnalysisOptions,
    ) -> Vec<CandidateSession> {
        scan_markers(events, Self::VOCABULARY, self.priority(), options)
    }
}

/// Per-package scan state.
struct PackageScan<'a> {
    vocabulary: MarkerVocabulary,
    priority: i32,
    options: &'a AnalysisOptions,
    stream_start: DateTime<Utc>,
    boots: &'a [DateTime<Utc>],
    /// Timestamps of every event naming the package, ascending.
    activity: &'a [DateTime<Utc>],
    spans: Vec<CandidateSession>,
    open: Option<CandidateSession>,
    seen_marker: bool,
}

impl PackageScan<'_> {
    fn boot_between(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        self.boots.iter().any(|&b| b > after && b <= until)
    }

    fn exceeds_gap(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        to - from > self.options.max_session_gap()
    }

    fn new_span(&self, package: &str, marker: &NormalizedLogEvent) -> CandidateSession {
        CandidateSession {
            package_name: package.to_string(),
            start_time: marker.timestamp,
            end_time: None,
            start_event_id: Some(marker.id.clone()),
            end_event_id: None,
            process_id: marker.process_id(),
            source_types: BTreeSet::from([self.vocabulary.source_type.to_string()]),
            priority: self.priority,
            source_event_ids: vec![marker.id.clone()],
            incomplete_reason: None,
            last_seen: marker.timestamp,
        }
    }

    fn close_incomplete(&mut self, reason: IncompleteReason) {
        if let Some(mut span) = self.open.take() {
            span.incomplete_reason = Some(reason);
            debug!(
                package = %span.package_name,
                source = self.vocabulary.source_type,
                %reason,
                "closing span without end marker"
            );
            self.spans.push(span);
        }
    }

    fn on_start(&mut self, package: &str, marker: &NormalizedLogEvent) {
        let now = marker.timestamp;
        if let Some(last_seen) = self.open.as_ref().map(|s| s.last_seen) {
            if self.boot_between(last_seen, now) {
                self.close_incomplete(IncompleteReason::DeviceReboot);
            } else if self.exceeds_gap(last_seen, now) {
                self.close_incomplete(IncompleteReason::MissingEnd);
            } else if let Some(span) = self.open.as_mut() {
                span.record_event(&marker.id, now);
                span.process_id = span.process_id.or_else(|| marker.process_id());
                return;
            }
        }

        // Resume shortly after a clean close: same usage, reopen it
        let reopen = self.spans.last().is_some_and(|prev| {
            prev.incomplete_reason.is_none()
                && prev
                    .end_time
                    .is_some_and(|end| !self.exceeds_gap(end, now) && !self.boot_between(end, now))
        });
        if reopen {
            if let Some(mut prev) = self.spans.pop() {
                prev.end_time = None;
                prev.end_event_id = None;
                prev.record_event(&marker.id, now);
                self.open = Some(prev);
                return;
            }
        }

        self.open = Some(self.new_span(package, marker));
    }

    fn on_end(&mut self, package: &str, marker: &NormalizedLogEvent) {
        let now = marker.timestamp;
        if let Some(last_seen) = self.open.as_ref().map(|s| s.last_seen) {
            if self.boot_between(last_seen, now) {
                self.close_incomplete(IncompleteReason::DeviceReboot);
            } else if self.exceeds_gap(last_seen, now) {
                self.close_incomplete(IncompleteReason::MissingEnd);
            } else if let Some(mut span) = self.open.take() {
                span.end_time = Some(now);
                span.end_event_id = Some(marker.id.clone());
                span.record_event(&marker.id, now);
                self.spans.push(span);
                return;
            }
        }

        // A second end marker right after a close (paused, then stopped)
        if let Some(prev) = self.spans.last_mut() {
            if prev.incomplete_reason.is_none()
                && prev
                    .end_time
                    .is_some_and(|end| now - end <= self.options.max_session_gap())
            {
                prev.end_time = Some(now);
                prev.end_event_id = Some(marker.id.clone());
                prev.record_event(&marker.id, now);
                return;
            }
        }

        let orphan = self.orphan_end(package, marker);
        self.spans.push(orphan);
    }

    /// Builds a span for an end marker that has no start marker.
    fn orphan_end(&self, package: &str, marker: &NormalizedLogEvent) -> CandidateSession {
        let now = marker.timestamp;
        let floor = self.spans.last().map(CandidateSession::effective_end);
        let start = self
            .activity
            .iter()
            .copied()
            .find(|&t| floor.is_none_or(|f| t > f) && t <= now && !self.exceeds_gap(t, now))
            .unwrap_or(now);
        let reason = if !self.seen_marker && !self.exceeds_gap(self.stream_start, now) {
            IncompleteReason::LogTruncated
        } else {
            IncompleteReason::MissingStart
        };
        debug!(
            package,
            source = self.vocabulary.source_type,
            %reason,
            "end marker without start marker"
        );
        CandidateSession {
            package_name: package.to_string(),
            start_time: start,
            end_time: Some(now),
            start_event_id: None,
            end_event_id: Some(marker.id.clone()),
            process_id: marker.process_id(),
            source_types: BTreeSet::from([self.vocabulary.source_type.to_string()]),
            priority: self.priority,
            source_event_ids: vec![marker.id.clone()],
            incomplete_reason: Some(reason),
            last_seen: now,
        }
    }

    fn finish(mut self) -> Vec<CandidateSession> {
        if let Some(last_seen) = self.open.as_ref().map(|s| s.last_seen) {
            let reason = if self.boots.iter().any(|&b| b > last_seen) {
                IncompleteReason::DeviceReboot
            } else {
                IncompleteReason::MissingEnd
            };
            self.close_incomplete(reason);
        }
        self.spans
    }
}

/// Events naming one package.
struct PackageEvents<'a> {
    /// Package name as first seen.
    package: String,
    markers: Vec<&'a NormalizedLogEvent>,
    /// Timestamps of every event naming the package, ascending.
    activity: Vec<DateTime<Utc>>,
}

/// Scans one source's markers into candidate spans.
fn scan_markers(
    events: &[&NormalizedLogEvent],
    vocabulary: MarkerVocabulary,
    priority: i32,
    options: &AnalysisOptions,
) -> Vec<CandidateSession> {
    let Some(stream_start) = events.first().map(|e| e.timestamp) else {
        return Vec::new();
    };

    let boots: Vec<DateTime<Utc>> = events
        .iter()
        .filter(|e| e.event_type == EventType::DeviceBoot)
        .map(|e| e.timestamp)
        .collect();

    // Key: lowercase package name
    let mut packages: BTreeMap<String, PackageEvents<'_>> = BTreeMap::new();
    for event in events {
        let Some(package) = event.package() else {
            continue;
        };
        let entry = packages
            .entry(package.to_ascii_lowercase())
            .or_insert_with(|| PackageEvents {
                package,
                markers: Vec::new(),
                activity: Vec::new(),
            });
        entry.activity.push(event.timestamp);
        if vocabulary.start.contains(&event.event_type) || vocabulary.end.contains(&event.event_type)
        {
            entry.markers.push(event);
        }
    }

    let mut candidates = Vec::new();
    for PackageEvents {
        package,
        markers,
        activity,
    } in packages.into_values()
    {
        if markers.is_empty() {
            continue;
        }
        let mut scan = PackageScan {
            vocabulary,
            priority,
            options,
            stream_start,
            boots: &boots,
            activity: &activity,
            spans: Vec::new(),
            open: None,
            seen_marker: false,
        };
        for marker in markers {
            if vocabulary.start.contains(&marker.event_type) {
                scan.on_start(&package, marker);
            } else {
                scan.on_end(&package, marker);
            }
            scan.seen_marker = true;
        }
        candidates.extend(scan.finish());
    }

    debug!(
        source = vocabulary.source_type,
        count = candidates.len(),
        "proposed candidate sessions"
    );
    candidates
}
