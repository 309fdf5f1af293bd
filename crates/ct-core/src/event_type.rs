//! Event type enum as the single source of truth for event type strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed vocabulary of normalized log event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    CameraConnect,
    CameraDisconnect,
    ActivityResumed,
    ActivityPaused,
    ActivityStopped,
    ForegroundServiceStart,
    ForegroundServiceStop,
    DatabaseInsert,
    MediaInsertEnd,
    MediaExtractor,
    ShutterSound,
    PlayerCreated,
    PlayerEvent,
    PlayerReleased,
    VibrationEvent,
    CameraShutterHaptic,
    UriPermissionGrant,
    UriPermissionRevoke,
    DeviceBoot,
    /// Tag the upstream parser produced but this vocabulary does not know.
    Unknown,
}

impl EventType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 20] = [
        Self::CameraConnect,
        Self::CameraDisconnect,
        Self::ActivityResumed,
        Self::ActivityPaused,
        Self::ActivityStopped,
        Self::ForegroundServiceStart,
        Self::ForegroundServiceStop,
        Self::DatabaseInsert,
        Self::MediaInsertEnd,
        Self::MediaExtractor,
        Self::ShutterSound,
        Self::PlayerCreated,
        Self::PlayerEvent,
        Self::PlayerReleased,
        Self::VibrationEvent,
        Self::CameraShutterHaptic,
        Self::UriPermissionGrant,
        Self::UriPermissionRevoke,
        Self::DeviceBoot,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CameraConnect => "CAMERA_CONNECT",
            Self::CameraDisconnect => "CAMERA_DISCONNECT",
            Self::ActivityResumed => "ACTIVITY_RESUMED",
            Self::ActivityPaused => "ACTIVITY_PAUSED",
            Self::ActivityStopped => "ACTIVITY_STOPPED",
            Self::ForegroundServiceStart => "FOREGROUND_SERVICE_START",
            Self::ForegroundServiceStop => "FOREGROUND_SERVICE_STOP",
            Self::DatabaseInsert => "DATABASE_INSERT",
            Self::MediaInsertEnd => "MEDIA_INSERT_END",
            Self::MediaExtractor => "MEDIA_EXTRACTOR",
            Self::ShutterSound => "SHUTTER_SOUND",
            Self::PlayerCreated => "PLAYER_CREATED",
            Self::PlayerEvent => "PLAYER_EVENT",
            Self::PlayerReleased => "PLAYER_RELEASED",
            Self::VibrationEvent => "VIBRATION_EVENT",
            Self::CameraShutterHaptic => "CAMERA_SHUTTER_HAPTIC",
            Self::UriPermissionGrant => "URI_PERMISSION_GRANT",
            Self::UriPermissionRevoke => "URI_PERMISSION_REVOKE",
            Self::DeviceBoot => "DEVICE_BOOT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Media-store writes: the strongest generic proof that a file was produced.
    #[must_use]
    pub const fn is_media_write(&self) -> bool {
        matches!(self, Self::DatabaseInsert | Self::MediaInsertEnd)
    }

    /// Audio player lifecycle signals. Individually weak: any app can play a sound.
    #[must_use]
    pub const fn is_audio_player(&self) -> bool {
        matches!(
            self,
            Self::PlayerCreated | Self::PlayerEvent | Self::PlayerReleased
        )
    }

    /// Types that can corroborate a capture without proving it.
    #[must_use]
    pub const fn is_supporting(&self) -> bool {
        matches!(
            self,
            Self::MediaExtractor
                | Self::ShutterSound
                | Self::PlayerCreated
                | Self::PlayerEvent
                | Self::PlayerReleased
                | Self::VibrationEvent
                | Self::UriPermissionGrant
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CAMERA_CONNECT" => Ok(Self::CameraConnect),
            "CAMERA_DISCONNECT" => Ok(Self::CameraDisconnect),
            "ACTIVITY_RESUMED" => Ok(Self::ActivityResumed),
            "ACTIVITY_PAUSED" => Ok(Self::ActivityPaused),
            "ACTIVITY_STOPPED" => Ok(Self::ActivityStopped),
            "FOREGROUND_SERVICE_START" => Ok(Self::ForegroundServiceStart),
            "FOREGROUND_SERVICE_STOP" => Ok(Self::ForegroundServiceStop),
            "DATABASE_INSERT" => Ok(Self::DatabaseInsert),
            "MEDIA_INSERT_END" => Ok(Self::MediaInsertEnd),
            "MEDIA_EXTRACTOR" => Ok(Self::MediaExtractor),
            "SHUTTER_SOUND" => Ok(Self::ShutterSound),
            "PLAYER_CREATED" => Ok(Self::PlayerCreated),
            "PLAYER_EVENT" => Ok(Self::PlayerEvent),
            "PLAYER_RELEASED" => Ok(Self::PlayerReleased),
            "VIBRATION_EVENT" => Ok(Self::VibrationEvent),
            "CAMERA_SHUTTER_HAPTIC" => Ok(Self::CameraShutterHaptic),
            "URI_PERMISSION_GRANT" => Ok(Self::UriPermissionGrant),
            "URI_PERMISSION_REVOKE" => Ok(Self::UriPermissionRevoke),
            "DEVICE_BOOT" | "BOOT_COMPLETED" => Ok(Self::DeviceBoot),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    /// Lenient: unrecognized tags become [`EventType::Unknown`] rather than
    /// failing the whole event.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Unknown))
    }
}

/// Error type for unknown event type strings.
#[derive(Debug, Clone)]
pub struct UnknownEventType(String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}
