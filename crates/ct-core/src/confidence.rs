//! Evidence-weighted confidence scoring.
//!
//! A capture's detection score is the sum of the weights of the *distinct*
//! event types among its evidence, clamped to 1.0. Repeats of one type count
//! once, so a single weak signal logged many times cannot inflate the score.

use std::collections::BTreeSet;

use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::types::Confidence;

/// Weight of a type with no evidential value of its own.
pub const DEFAULT_WEIGHT: f32 = 0.1;

/// Fixed weight of a single event type, in \[0.0, 1.0\].
pub const fn event_type_weight(event_type: EventType) -> f32 {
    match event_type {
        EventType::CameraShutterHaptic => 0.9,
        EventType::DatabaseInsert | EventType::MediaInsertEnd => 0.5,
        EventType::ShutterSound => 0.4,
        EventType::UriPermissionGrant | EventType::MediaExtractor => 0.3,
        EventType::PlayerEvent => 0.25,
        EventType::VibrationEvent | EventType::ForegroundServiceStart => 0.2,
        EventType::PlayerCreated | EventType::PlayerReleased => 0.15,
        EventType::CameraConnect
        | EventType::CameraDisconnect
        | EventType::ActivityResumed
        | EventType::ActivityPaused
        | EventType::ActivityStopped
        | EventType::ForegroundServiceStop
        | EventType::UriPermissionRevoke
        | EventType::DeviceBoot
        | EventType::Unknown => DEFAULT_WEIGHT,
    }
}

/// Scores a set of event types; order and repetition do not matter.
pub fn score_event_types(types: impl IntoIterator<Item = EventType>) -> Confidence {
    let distinct: BTreeSet<EventType> = types.into_iter().collect();
    if distinct.is_empty() {
        return Confidence::MIN;
    }
    let sum: f32 = distinct.into_iter().map(event_type_weight).sum();
    Confidence::clamped(sum)
}

/// Scores a set of evidence events.
pub fn calculate_confidence<'a>(
    evidence: impl IntoIterator<Item = &'a NormalizedLogEvent>,
) -> Confidence {
    score_event_types(evidence.into_iter().map(|e| e.event_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, event};

    #[test]
    fn weights_are_in_unit_range() {
        for event_type in EventType::ALL {
            let weight = event_type_weight(event_type);
            assert!(
                (0.0..=1.0).contains(&weight),
                "{event_type} weight {weight} out of range"
            );
        }
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact zero for empty input")]
    fn empty_evidence_scores_zero() {
        assert_eq!(calculate_confidence([]).value(), 0.0);
    }

    #[test]
    fn unknown_type_gets_default_weight() {
        let e = event("u", at(0), EventType::Unknown, None);
        let score = calculate_confidence([&e]);
        assert!((score.value() - DEFAULT_WEIGHT).abs() < 1e-6);
    }

    #[test]
    fn repeated_type_counts_once() {
        let a = event("a", at(0), EventType::DatabaseInsert, None);
        let b = event("b", at(1), EventType::ShutterSound, None);
        let c = event("c", at(2), EventType::ShutterSound, None);

        let base = calculate_confidence([&a, &b]);
        let repeated = calculate_confidence([&a, &b, &c]);
        assert!((base.value() - repeated.value()).abs() < 1e-6);
        assert!((base.value() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn order_does_not_matter() {
        let a = event("a", at(0), EventType::DatabaseInsert, None);
        let b = event("b", at(1), EventType::VibrationEvent, None);
        let c = event("c", at(2), EventType::PlayerEvent, None);

        let forward = calculate_confidence([&a, &b, &c]);
        let backward = calculate_confidence([&c, &b, &a]);
        assert!((forward.value() - backward.value()).abs() < 1e-6);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "clamped to exactly 1.0")]
    fn sum_is_clamped_to_one() {
        let events = [
            event("a", at(0), EventType::CameraShutterHaptic, None),
            event("b", at(0), EventType::DatabaseInsert, None),
            event("c", at(0), EventType::ShutterSound, None),
        ];
        assert_eq!(calculate_confidence(&events).value(), 1.0);
    }

    #[test]
    fn media_write_alone_meets_its_own_weight() {
        let e = event("db", at(0), EventType::DatabaseInsert, None);
        let score = calculate_confidence([&e]);
        assert!(score.value() >= event_type_weight(EventType::DatabaseInsert));
    }
}
