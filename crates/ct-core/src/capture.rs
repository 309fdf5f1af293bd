//! Inferred capture actions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_type::EventType;
use crate::types::{CaptureId, Confidence, EventId, SessionId};

/// One inferred photo or video capture inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraCaptureEvent {
    pub id: CaptureId,
    pub parent_session_id: SessionId,
    pub capture_time: DateTime<Utc>,
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// The event that proves the capture, absent for estimated captures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decisive_evidence_id: Option<EventId>,
    #[serde(default)]
    pub supporting_evidence_ids: Vec<EventId>,
    /// True when no decisive evidence exists.
    pub is_estimated: bool,
    /// Detection score, not a completeness score.
    pub confidence: Confidence,
    /// Distinct evidence types, decisive type first.
    #[serde(default)]
    pub evidence_types: Vec<EventType>,
    #[serde(default)]
    pub source_event_ids: Vec<EventId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Pass-through from the transmission detector; never computed here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_detected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_packets: Option<u64>,
}

impl CameraCaptureEvent {
    /// Every evidence id this capture relies on, decisive first.
    pub fn evidence_ids(&self) -> impl Iterator<Item = &EventId> {
        self.decisive_evidence_id
            .iter()
            .chain(&self.supporting_evidence_ids)
    }

    /// Primary evidence type, used when comparing captures with each other.
    pub fn primary_type(&self) -> EventType {
        self.evidence_types
            .first()
            .copied()
            .unwrap_or(EventType::Unknown)
    }
}
