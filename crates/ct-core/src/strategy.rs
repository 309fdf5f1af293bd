//! Capture detection strategies.
//!
//! Every strategy follows the same shape: pick anchor events that prove a
//! capture, attach nearby supporting evidence, and score the result. Vendor
//! strategies differ only in their [`EvidenceSignature`].
//!
//! # Algorithm Summary
//!
//! 1. Anchors: decisive events attributable to the session's package whose
//!    file path is not on a screenshot or download deny-list
//! 2. Anchors of different kinds a moment apart (shutter haptic, media-store
//!    row, insert-end marker) are one photo: the strongest becomes decisive,
//!    the rest join its supporting evidence
//! 3. For each anchor, gather supporting evidence within
//!    `event_correlation_window_ms`
//! 4. Weak audio-player evidence counts only while a post-processing
//!    foreground service is running (when the signature asks for it)
//! 5. Score anchor plus support with the confidence calculator
//! 6. Without any anchor, clusters of supporting evidence scoring above
//!    `min_confidence_threshold` become estimated captures

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::capture::CameraCaptureEvent;
use crate::confidence::{event_type_weight, score_event_types};
use crate::context::SessionContext;
use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::options::AnalysisOptions;
use crate::types::{CaptureId, Confidence};

/// Priority of the catch-all strategy.
pub const DEFAULT_STRATEGY_PRIORITY: i32 = 0;

/// Decisive traces of one photo land within this many milliseconds.
pub const ANCHOR_GROUP_WINDOW_MS: i64 = 2_000;

/// Service class fragments identifying camera post-processing services.
const POST_PROCESSING_SERVICE_HINTS: &[&str] = &[
    "postprocess",
    "post_process",
    "processing",
    "imagesaver",
    "savingservice",
];

/// Detects captures inside one session.
pub trait CaptureDetectionStrategy: Send + Sync {
    /// Short name for logging and capture metadata.
    fn name(&self) -> &'static str;

    /// Higher priorities are consulted first.
    fn priority(&self) -> i32;

    /// Case-insensitive package substring this strategy handles.
    /// `None` marks the catch-all default.
    fn package_pattern(&self) -> Option<&str>;

    /// Proposes candidate captures. No evidence yields an empty list.
    fn detect_captures(
        &self,
        context: &SessionContext<'_>,
        options: &AnalysisOptions,
    ) -> Vec<CameraCaptureEvent>;
}

/// The evidence a strategy looks for.
#[derive(Debug, Clone, Copy)]
pub struct EvidenceSignature {
    /// True if the event by itself proves a capture.
    pub is_decisive: fn(&NormalizedLogEvent) -> bool,
    /// True if the event corroborates a capture.
    pub is_supporting: fn(&NormalizedLogEvent) -> bool,
    /// The type an event is scored and labelled as.
    pub classify: fn(&NormalizedLogEvent) -> EventType,
    /// Require a post-processing service window for audio-player evidence.
    pub validate_audio: bool,
}

impl EvidenceSignature {
    /// Media-store writes anchor; generic corroboration supports.
    pub const GENERIC: Self = Self {
        is_decisive: |e| e.event_type.is_media_write(),
        is_supporting: |e| e.event_type.is_supporting(),
        classify: |e| e.event_type,
        validate_audio: true,
    };
}

/// True if a service class looks like a camera post-processing service.
pub fn is_post_processing_service(service_class: &str) -> bool {
    let lower = service_class.to_ascii_lowercase();
    POST_PROCESSING_SERVICE_HINTS
        .iter()
        .any(|hint| lower.contains(hint))
}

/// Generic heuristics used when no vendor strategy matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCaptureStrategy;

impl CaptureDetectionStrategy for DefaultCaptureStrategy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn priority(&self) -> i32 {
        DEFAULT_STRATEGY_PRIORITY
    }

    fn package_pattern(&self) -> Option<&str> {
        None
    }

    fn detect_captures(
        &self,
        context: &SessionContext<'_>,
        options: &AnalysisOptions,
    ) -> Vec<CameraCaptureEvent> {
        detect_with_signature(self.name(), &EvidenceSignature::GENERIC, context, options)
    }
}

/// Runs the shared anchor/support/score pipeline for one signature.
pub fn detect_with_signature(
    strategy: &str,
    signature: &EvidenceSignature,
    context: &SessionContext<'_>,
    options: &AnalysisOptions,
) -> Vec<CameraCaptureEvent> {
    if context.is_empty() {
        return Vec::new();
    }
    let package = context.package_name();
    let window = options.event_correlation_window();

    let anchors: Vec<&NormalizedLogEvent> = context
        .events
        .iter()
        .copied()
        .filter(|e| (signature.is_decisive)(e) && e.is_attributable_to(package))
        .filter(|e| !is_excluded_path(e, options))
        .collect();

    let is_valid_support = |e: &NormalizedLogEvent| {
        if !(signature.is_supporting)(e) || !e.is_attributable_to(package) {
            return false;
        }
        if signature.validate_audio && e.event_type.is_audio_player() {
            let validated = context.service_running_at(e.timestamp, is_post_processing_service);
            if !validated {
                debug!(event = %e.id, "audio evidence outside post-processing window");
            }
            return validated;
        }
        true
    };

    let mut builder = CaptureBuilder {
        strategy,
        signature,
        context,
        next_index: 1,
    };

    if !anchors.is_empty() {
        return group_anchors(&anchors, signature)
            .into_iter()
            .map(|group| {
                let anchor = strongest_event(&group, signature);
                let mut supporting: Vec<&NormalizedLogEvent> = group
                    .iter()
                    .copied()
                    .filter(|e| e.id != anchor.id)
                    .collect();
                supporting.extend(
                    context
                        .events_near(anchor.timestamp, window)
                        .filter(|e| !(signature.is_decisive)(e))
                        .filter(|e| is_valid_support(*e)),
                );
                supporting.sort_by_key(|e| e.timestamp);
                builder.build(Some(anchor), anchor.timestamp, &supporting)
            })
            .collect();
    }

    // No proof in this session: fall back to clusters of corroboration
    let support: Vec<&NormalizedLogEvent> = context
        .events
        .iter()
        .copied()
        .filter(|e| is_valid_support(*e))
        .collect();

    let mut captures = Vec::new();
    for cluster in cluster_by_window(&support, window) {
        let score = score_event_types(cluster.iter().map(|e| (signature.classify)(e)));
        if score.value() <= options.min_confidence_threshold {
            debug!(
                package,
                score = score.value(),
                "supporting evidence below threshold"
            );
            continue;
        }
        if cluster.iter().any(|e| is_excluded_path(e, options)) {
            continue;
        }
        let at = strongest_event(&cluster, signature).timestamp;
        captures.push(builder.build(None, at, &cluster));
    }
    captures
}

/// Splits time-ordered events into runs no wider than `window`.
fn cluster_by_window<'a>(
    events: &[&'a NormalizedLogEvent],
    window: chrono::Duration,
) -> Vec<Vec<&'a NormalizedLogEvent>> {
    let mut clusters: Vec<Vec<&NormalizedLogEvent>> = Vec::new();
    for &event in events {
        match clusters.last_mut() {
            Some(cluster) if event.timestamp - cluster[0].timestamp <= window => cluster.push(event),
            _ => clusters.push(vec![event]),
        }
    }
    clusters
}

/// Groups time-ordered anchors that belong to one photo.
///
/// An anchor joins the current group when it is within
/// [`ANCHOR_GROUP_WINDOW_MS`] of the group's first anchor, its kind is not in
/// the group yet, and it names no file other than the group's. Two anchors of
/// one kind stay apart so duplicate collapsing can judge them.
fn group_anchors<'a>(
    anchors: &[&'a NormalizedLogEvent],
    signature: &EvidenceSignature,
) -> Vec<Vec<&'a NormalizedLogEvent>> {
    let window = Duration::milliseconds(ANCHOR_GROUP_WINDOW_MS);
    let fits = |group: &[&NormalizedLogEvent], anchor: &NormalizedLogEvent| {
        anchor.timestamp - group[0].timestamp <= window
            && group.iter().all(|member| {
                (signature.classify)(member) != (signature.classify)(anchor)
                    && !names_other_file(member, anchor)
            })
    };

    let mut groups: Vec<Vec<&NormalizedLogEvent>> = Vec::new();
    for &anchor in anchors {
        match groups.last_mut() {
            Some(group) if fits(group.as_slice(), anchor) => group.push(anchor),
            _ => groups.push(vec![anchor]),
        }
    }
    groups
}

fn names_other_file(a: &NormalizedLogEvent, b: &NormalizedLogEvent) -> bool {
    matches!((a.file_path(), b.file_path()), (Some(pa), Some(pb)) if pa != pb)
}

/// Earliest highest-weight event in a non-empty run.
fn strongest_event<'a>(
    events: &[&'a NormalizedLogEvent],
    signature: &EvidenceSignature,
) -> &'a NormalizedLogEvent {
    let mut best = events[0];
    for &event in &events[1..] {
        if event_type_weight((signature.classify)(event))
            > event_type_weight((signature.classify)(best))
        {
            best = event;
        }
    }
    best
}

fn is_excluded_path(event: &NormalizedLogEvent, options: &AnalysisOptions) -> bool {
    let Some(path) = event.file_path() else {
        return false;
    };
    if let Some(pattern) = options.excluded_path_pattern(&path) {
        debug!(event = %event.id, %path, pattern, "rejecting evidence on deny-listed path");
        return true;
    }
    false
}

/// Assembles capture records for one session.
struct CaptureBuilder<'s> {
    strategy: &'s str,
    signature: &'s EvidenceSignature,
    context: &'s SessionContext<'s>,
    next_index: usize,
}

impl CaptureBuilder<'_> {
    fn build(
        &mut self,
        anchor: Option<&NormalizedLogEvent>,
        capture_time: DateTime<Utc>,
        supporting: &[&NormalizedLogEvent],
    ) -> CameraCaptureEvent {
        let session = self.context.session;
        let id = CaptureId::new(format!("{}-capture-{}", session.id, self.next_index))
            .unwrap_or_else(|_| unreachable!("formatted capture id is never empty"));
        self.next_index += 1;

        let evidence: Vec<&NormalizedLogEvent> =
            anchor.into_iter().chain(supporting.iter().copied()).collect();
        let confidence: Confidence =
            score_event_types(evidence.iter().map(|e| (self.signature.classify)(e)));

        let mut evidence_types: Vec<EventType> = Vec::new();
        for event in &evidence {
            let label = (self.signature.classify)(event);
            if !evidence_types.contains(&label) {
                evidence_types.push(label);
            }
        }

        let mut metadata: BTreeMap<String, serde_json::Value> = anchor
            .map(|a| a.attributes.clone())
            .unwrap_or_default();
        metadata.insert("strategy".to_string(), self.strategy.into());
        if let Some(a) = anchor {
            metadata.insert("source_section".to_string(), a.source_section.clone().into());
        }

        let file_path = anchor
            .and_then(NormalizedLogEvent::file_path)
            .or_else(|| evidence.iter().find_map(|e| e.file_path()));

        debug!(
            capture = %id,
            strategy = self.strategy,
            estimated = anchor.is_none(),
            score = confidence.value(),
            "capture detected"
        );

        CameraCaptureEvent {
            id,
            parent_session_id: session.id.clone(),
            capture_time,
            package_name: session.package_name.clone(),
            file_path,
            decisive_evidence_id: anchor.map(|a| a.id.clone()),
            supporting_evidence_ids: supporting.iter().map(|e| e.id.clone()).collect(),
            is_estimated: anchor.is_none(),
            confidence,
            evidence_types,
            source_event_ids: evidence.iter().map(|e| e.id.clone()).collect(),
            metadata,
            transmission_detected: None,
            transmission_packets: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::fixtures::{CAMERA_PKG, at, at_ms, event};
    use crate::session::CameraSession;
    use crate::types::{EventId, SessionId};

    fn session(end: Option<i64>) -> CameraSession {
        CameraSession {
            id: SessionId::new("session-1").unwrap(),
            start_time: at(0),
            end_time: end.map(at),
            package_name: CAMERA_PKG.to_string(),
            process_id: None,
            source_log_types: BTreeSet::new(),
            capture_event_ids: Vec::new(),
            start_event_id: None,
            end_event_id: None,
            incomplete_reason: None,
            confidence: Confidence::MAX,
            source_event_ids: Vec::new(),
        }
    }

    fn detect(session: &CameraSession, events: &[NormalizedLogEvent]) -> Vec<CameraCaptureEvent> {
        let ctx = SessionContext::new(session, events).unwrap();
        DefaultCaptureStrategy.detect_captures(&ctx, &AnalysisOptions::default())
    }

    #[test]
    fn media_insert_anchors_capture() {
        let s = session(Some(300));
        let events = vec![
            event("c1", at(0), EventType::CameraConnect, Some(CAMERA_PKG)),
            event("db", at(30), EventType::DatabaseInsert, None)
                .with_attr("path", "/storage/emulated/0/DCIM/Camera/IMG_0001.jpg"),
            event("d1", at(300), EventType::CameraDisconnect, Some(CAMERA_PKG)),
        ];
        let captures = detect(&s, &events);

        assert_eq!(captures.len(), 1);
        let capture = &captures[0];
        assert_eq!(capture.id.as_str(), "session-1-capture-1");
        assert_eq!(capture.capture_time, at(30));
        assert!(!capture.is_estimated);
        assert_eq!(capture.decisive_evidence_id.as_ref().unwrap().as_str(), "db");
        assert_eq!(
            capture.file_path.as_deref(),
            Some("/storage/emulated/0/DCIM/Camera/IMG_0001.jpg")
        );
        assert!(capture.confidence.value() >= event_type_weight(EventType::DatabaseInsert));
    }

    #[test]
    fn insert_and_insert_end_of_one_photo_yield_one_capture() {
        let s = session(Some(300));
        let events = vec![
            event("db", at(30), EventType::DatabaseInsert, None)
                .with_attr("path", "/DCIM/Camera/IMG_1.jpg"),
            event("end", at(31), EventType::MediaInsertEnd, None),
        ];
        let captures = detect(&s, &events);

        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].decisive_evidence_id.as_ref().unwrap().as_str(), "db");
        assert_eq!(captures[0].supporting_evidence_ids[0].as_str(), "end");
        assert_eq!(captures[0].capture_time, at(30));
        // 0.5 + 0.5
        assert!((captures[0].confidence.value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn burst_inserts_of_different_files_stay_apart() {
        let s = session(Some(300));
        let events = vec![
            event("db1", at_ms(30_000), EventType::DatabaseInsert, None)
                .with_attr("path", "/DCIM/Camera/IMG_1.jpg"),
            event("end", at_ms(30_300), EventType::MediaInsertEnd, None)
                .with_attr("path", "/DCIM/Camera/IMG_2.jpg"),
            event("db2", at_ms(30_600), EventType::DatabaseInsert, None)
                .with_attr("path", "/DCIM/Camera/IMG_2.jpg"),
        ];
        let captures = detect(&s, &events);

        let paths: Vec<_> = captures.iter().map(|c| c.file_path.as_deref()).collect();
        assert_eq!(
            paths,
            vec![Some("/DCIM/Camera/IMG_1.jpg"), Some("/DCIM/Camera/IMG_2.jpg")]
        );
        assert_eq!(captures[1].decisive_evidence_id.as_ref().unwrap().as_str(), "end");
    }

    #[test]
    fn anchors_further_apart_than_group_window_stay_apart() {
        let s = session(Some(300));
        let events = vec![
            event("db", at(30), EventType::DatabaseInsert, None),
            event("end", at(33), EventType::MediaInsertEnd, None),
        ];
        assert_eq!(detect(&s, &events).len(), 2);
    }

    #[test]
    fn supporting_evidence_within_window_is_attached() {
        let s = session(Some(300));
        let events = vec![
            event("shutter", at(29), EventType::ShutterSound, Some(CAMERA_PKG)),
            event("db", at(30), EventType::DatabaseInsert, None),
            event("vib", at(59), EventType::VibrationEvent, Some(CAMERA_PKG)),
            event("late", at(61), EventType::VibrationEvent, Some(CAMERA_PKG)),
        ];
        let captures = detect(&s, &events);

        assert_eq!(captures.len(), 1);
        let supporting: Vec<_> = captures[0]
            .supporting_evidence_ids
            .iter()
            .map(EventId::to_string)
            .collect();
        assert_eq!(supporting, vec!["shutter", "vib"]);
        // 0.5 + 0.4 + 0.2, clamped
        assert!((captures[0].confidence.value() - 1.0).abs() < 1e-6);
        assert_eq!(
            captures[0].evidence_types,
            vec![
                EventType::DatabaseInsert,
                EventType::ShutterSound,
                EventType::VibrationEvent
            ]
        );
    }

    #[test]
    fn audio_without_post_processing_service_is_ignored() {
        let s = session(Some(300));
        let events = vec![
            event("db", at(30), EventType::DatabaseInsert, None),
            event("player", at(31), EventType::PlayerEvent, Some(CAMERA_PKG)),
        ];
        let captures = detect(&s, &events);
        assert!(captures[0].supporting_evidence_ids.is_empty());
    }

    #[test]
    fn audio_during_post_processing_service_is_kept() {
        let s = session(Some(300));
        let class = "com.android.camera.ImageSaverService";
        let events = vec![
            event("fs", at(29), EventType::ForegroundServiceStart, Some(CAMERA_PKG))
                .with_attr("class", class),
            event("db", at(30), EventType::DatabaseInsert, None),
            event("player", at(31), EventType::PlayerEvent, Some(CAMERA_PKG)),
            event("fs_stop", at(35), EventType::ForegroundServiceStop, Some(CAMERA_PKG))
                .with_attr("class", class),
        ];
        let captures = detect(&s, &events);
        assert_eq!(captures[0].supporting_evidence_ids.len(), 1);
        assert_eq!(captures[0].supporting_evidence_ids[0].as_str(), "player");
    }

    #[test]
    fn screenshot_paths_are_rejected() {
        let s = session(Some(300));
        let events = vec![
            event("db", at(30), EventType::DatabaseInsert, None)
                .with_attr("path", "/storage/emulated/0/Pictures/Screenshots/s.png"),
        ];
        assert!(detect(&s, &events).is_empty());
    }

    #[test]
    fn media_writes_of_other_packages_are_ignored() {
        let s = session(Some(300));
        let events = vec![event("db", at(30), EventType::DatabaseInsert, Some("com.gallery"))];
        assert!(detect(&s, &events).is_empty());
    }

    #[test]
    fn strong_support_without_anchor_yields_estimated_capture() {
        let s = session(Some(300));
        let events = vec![
            event("shutter", at(40), EventType::ShutterSound, Some(CAMERA_PKG)),
            event("uri", at(41), EventType::UriPermissionGrant, Some(CAMERA_PKG)),
        ];
        let captures = detect(&s, &events);

        assert_eq!(captures.len(), 1);
        assert!(captures[0].is_estimated);
        assert!(captures[0].decisive_evidence_id.is_none());
        assert_eq!(captures[0].capture_time, at(40));
        // 0.4 + 0.3 exceeds 0.5
        assert!((captures[0].confidence.value() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn weak_support_without_anchor_yields_nothing() {
        let s = session(Some(300));
        let events = vec![event("shutter", at(40), EventType::ShutterSound, Some(CAMERA_PKG))];
        assert!(detect(&s, &events).is_empty());
    }

    #[test]
    fn empty_session_yields_nothing() {
        let s = session(Some(300));
        assert!(detect(&s, &[]).is_empty());
    }

    #[test]
    fn post_processing_hints_match_case_insensitively() {
        assert!(is_post_processing_service("com.sec.PostProcessService"));
        assert!(is_post_processing_service("ImageSaverService"));
        assert!(!is_post_processing_service("com.spotify.PlaybackService"));
    }
}
