//! Normalized log events produced by the upstream parsers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_type::EventType;
use crate::types::EventId;

/// Attribute keys that carry a file path or content URI, in lookup order.
const PATH_KEYS: &[&str] = &["path", "file_path", "filePath", "_data", "uri"];

/// Attribute keys that carry a package name when the event itself has none.
const PACKAGE_KEYS: &[&str] = &["package", "packageName", "package_name"];

/// One already-normalized log line.
///
/// Attributes are loosely typed: a missing or oddly typed attribute is a valid
/// state and never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLogEvent {
    /// Unique identifier for this event.
    pub id: EventId,
    /// When the event occurred (UTC).
    pub timestamp: DateTime<Utc>,
    /// The normalized event type.
    pub event_type: EventType,
    /// Package the event is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Log section or file the event was parsed from (e.g. `usagestats`).
    #[serde(default)]
    pub source_section: String,
    /// Parsed attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// The raw line the event was parsed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_line: Option<String>,
}

impl NormalizedLogEvent {
    /// Returns an attribute rendered as a string, if present and non-null.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.get(key).and_then(value_as_string)
    }

    /// Returns the first present attribute among `keys`.
    pub fn first_attribute(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| self.attribute(key))
    }

    /// Package name, falling back to a package attribute.
    pub fn package(&self) -> Option<String> {
        self.package_name
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| self.first_attribute(PACKAGE_KEYS))
    }

    /// Returns true if the event names `package` (case-insensitive).
    pub fn is_for_package(&self, package: &str) -> bool {
        self.package()
            .is_some_and(|p| p.eq_ignore_ascii_case(package))
    }

    /// Returns true if the event names `package` or names no package at all.
    ///
    /// System-level evidence such as media-store writes is often logged
    /// without the originating app.
    pub fn is_attributable_to(&self, package: &str) -> bool {
        self.package()
            .is_none_or(|p| p.eq_ignore_ascii_case(package))
    }

    /// File path or content URI the event refers to.
    pub fn file_path(&self) -> Option<String> {
        self.first_attribute(PATH_KEYS)
    }

    /// Process id from the `pid` attribute.
    pub fn process_id(&self) -> Option<u32> {
        self.attribute("pid").and_then(|pid| pid.trim().parse().ok())
    }
}

/// Renders a loosely typed scalar as a string. `null` is treated as absent.
pub fn value_as_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
