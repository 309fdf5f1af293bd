//! Vendor-specific capture strategies.

use crate::capture::CameraCaptureEvent;
use crate::context::SessionContext;
use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::options::AnalysisOptions;
use crate::strategy::{CaptureDetectionStrategy, EvidenceSignature, detect_with_signature};

pub const SAMSUNG_CAMERA_PACKAGE: &str = "com.sec.android.app.camera";
pub const KAKAOTALK_PACKAGE: &str = "com.kakao.talk";

/// Haptic pattern Samsung plays on the shutter.
const SAMSUNG_SHUTTER_HAPTIC_TYPE: &str = "50061";

const HAPTIC_TYPE_KEYS: &[&str] = &["hapticType", "haptic_type", "effect"];

fn is_samsung_shutter_vibration(event: &NormalizedLogEvent) -> bool {
    event.event_type == EventType::VibrationEvent
        && event.first_attribute(HAPTIC_TYPE_KEYS).as_deref() == Some(SAMSUNG_SHUTTER_HAPTIC_TYPE)
}

fn samsung_is_decisive(event: &NormalizedLogEvent) -> bool {
    event.event_type.is_media_write()
        || event.event_type == EventType::CameraShutterHaptic
        || is_samsung_shutter_vibration(event)
}

fn samsung_classify(event: &NormalizedLogEvent) -> EventType {
    if is_samsung_shutter_vibration(event) {
        EventType::CameraShutterHaptic
    } else {
        event.event_type
    }
}

/// Samsung stock camera. Shutter haptics anchor captures and absorb the
/// media-store write of the same photo; audio is trusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SamsungCameraStrategy;

impl SamsungCameraStrategy {
    const SIGNATURE: EvidenceSignature = EvidenceSignature {
        is_decisive: samsung_is_decisive,
        is_supporting: |e| e.event_type.is_supporting() && !samsung_is_decisive(e),
        classify: samsung_classify,
        validate_audio: false,
    };
}

impl CaptureDetectionStrategy for SamsungCameraStrategy {
    fn name(&self) -> &'static str {
        "samsung"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn package_pattern(&self) -> Option<&str> {
        Some(SAMSUNG_CAMERA_PACKAGE)
    }

    fn detect_captures(
        &self,
        context: &SessionContext<'_>,
        options: &AnalysisOptions,
    ) -> Vec<CameraCaptureEvent> {
        detect_with_signature(self.name(), &Self::SIGNATURE, context, options)
    }
}

fn is_kakao_provider_grant(event: &NormalizedLogEvent) -> bool {
    if event.event_type != EventType::UriPermissionGrant {
        return false;
    }
    event
        .first_attribute(&["uri", "authority"])
        .is_some_and(|uri| {
            let uri = uri.to_ascii_lowercase();
            uri.contains(KAKAOTALK_PACKAGE) && uri.contains("provider")
        })
}

fn kakao_is_decisive(event: &NormalizedLogEvent) -> bool {
    event.event_type.is_media_write() || is_kakao_provider_grant(event)
}

/// KakaoTalk in-app camera. Shares leave a file-provider URI grant.
#[derive(Debug, Clone, Copy, Default)]
pub struct KakaoTalkStrategy;

impl KakaoTalkStrategy {
    const SIGNATURE: EvidenceSignature = EvidenceSignature {
        is_decisive: kakao_is_decisive,
        is_supporting: |e| e.event_type.is_supporting() && !kakao_is_decisive(e),
        classify: |e| e.event_type,
        validate_audio: true,
    };
}

impl CaptureDetectionStrategy for KakaoTalkStrategy {
    fn name(&self) -> &'static str {
        "kakaotalk"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn package_pattern(&self) -> Option<&str> {
        Some(KAKAOTALK_PACKAGE)
    }

    fn detect_captures(
        &self,
        context: &SessionContext<'_>,
        options: &AnalysisOptions,
    ) -> Vec<CameraCaptureEvent> {
        detect_with_signature(self.name(), &Self::SIGNATURE, context, options)
    }
}
