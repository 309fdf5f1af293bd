//! Camera capture timeline correlation.
//!
//! This crate turns normalized device log events into:
//! - Sessions: bounded periods of camera-app usage, merged across log sources
//! - Captures: individual photo/video actions with a detection score
//! - Timelines: one sorted display sequence of both
//!
//! It performs no I/O; callers supply events and options.

mod analyzer;
pub mod capture;
pub mod confidence;
pub mod context;
pub mod dedup;
mod detector;
pub mod error;
pub mod event;
pub mod event_type;
pub mod options;
pub mod result;
pub mod session;
mod session_detector;
pub mod session_source;
pub mod strategy;
pub mod timeline;
pub mod types;
pub mod vendor;

#[cfg(test)]
mod fixtures;

pub use analyzer::Analyzer;
pub use capture::CameraCaptureEvent;
pub use confidence::{calculate_confidence, event_type_weight};
pub use context::{ForegroundServiceInfo, SessionContext, create_context, session_horizons};
pub use dedup::{
    CameraDeduplicationStrategy, Deduplicatable, DeduplicationInfo, DeduplicationStrategy,
    EventDeduplicator, TimeBasedDeduplicationStrategy,
};
pub use detector::CameraCaptureDetector;
pub use error::{AnalysisError, Result};
pub use event::NormalizedLogEvent;
pub use event_type::{EventType, UnknownEventType};
pub use options::AnalysisOptions;
pub use result::{AnalysisProgress, AnalysisResult, AnalysisStage, AnalysisStatistics};
pub use session::{CameraSession, IncompleteReason};
pub use session_detector::SessionDetector;
pub use session_source::{MediaCameraSessionSource, SessionSource, UsageStatsSessionSource};
pub use strategy::{CaptureDetectionStrategy, DefaultCaptureStrategy};
pub use timeline::{TimelineColor, TimelineItem, TimelineKind, build_timeline};
pub use types::{CaptureId, Confidence, EventId, SessionId, ValidationError};
pub use vendor::{KakaoTalkStrategy, SamsungCameraStrategy};
