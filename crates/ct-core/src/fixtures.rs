//! Shared builders for unit tests.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::types::EventId;

pub const CAMERA_PKG: &str = "com.android.camera2";

/// Fixed reference instant for tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    t0() + Duration::milliseconds(ms)
}

/// Builds an event; the source section follows the usual log for its type.
pub fn event(
    id: &str,
    timestamp: DateTime<Utc>,
    event_type: EventType,
    package: Option<&str>,
) -> NormalizedLogEvent {
    let source_section = match event_type {
        EventType::CameraConnect | EventType::CameraDisconnect => "media.camera",
        EventType::ActivityResumed
        | EventType::ActivityPaused
        | EventType::ActivityStopped
        | EventType::ForegroundServiceStart
        | EventType::ForegroundServiceStop => "usagestats",
        EventType::DatabaseInsert | EventType::MediaInsertEnd => "media.provider",
        EventType::PlayerCreated | EventType::PlayerEvent | EventType::PlayerReleased => "audio",
        EventType::VibrationEvent | EventType::CameraShutterHaptic => "vibrator_manager",
        _ => "logcat",
    };
    NormalizedLogEvent {
        id: EventId::new(id).unwrap(),
        timestamp,
        event_type,
        package_name: package.map(String::from),
        source_section: source_section.to_string(),
        attributes: BTreeMap::new(),
        raw_line: None,
    }
}

impl NormalizedLogEvent {
    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn with_section(mut self, section: &str) -> Self {
        self.source_section = section.to_string();
        self
    }
}
