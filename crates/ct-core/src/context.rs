//! Session-scoped views over the event stream.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::{AnalysisError, Result};
use crate::event::NormalizedLogEvent;
use crate::event_type::EventType;
use crate::session::CameraSession;

/// Seconds after the session end during which events still belong to it.
///
/// Media-store writes are often logged seconds after the UI closes.
pub const SESSION_END_GRACE_SECS: i64 = 10;

/// Attribute keys naming a foreground service class, in lookup order.
const SERVICE_CLASS_KEYS: &[&str] = &["class", "service_class", "serviceClass", "service"];

/// A foreground service run observed during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundServiceInfo {
    pub service_class: String,
    pub start_time: DateTime<Utc>,
    /// Absent when no matching stop was logged.
    pub stop_time: Option<DateTime<Utc>>,
}

impl ForegroundServiceInfo {
    pub fn duration(&self) -> Option<Duration> {
        self.stop_time.map(|stop| stop - self.start_time)
    }

    /// True if `timestamp` falls inside the run; open runs never end.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start_time && self.stop_time.is_none_or(|stop| timestamp <= stop)
    }
}

/// Everything a capture detection strategy needs about one session.
///
/// Built per session, handed to exactly one strategy, then dropped.
#[derive(Debug)]
pub struct SessionContext<'a> {
    pub session: &'a CameraSession,
    /// Events inside `[start, end + 10s]` and before the horizon, ascending.
    pub events: Vec<&'a NormalizedLogEvent>,
    pub activity_resumed_at: Option<DateTime<Utc>>,
    pub activity_paused_at: Option<DateTime<Utc>>,
    pub foreground_services: Vec<ForegroundServiceInfo>,
    /// Unix second → indices into `events`.
    buckets: BTreeMap<i64, Vec<usize>>,
}

impl<'a> SessionContext<'a> {
    /// Builds the context for `session` out of the full event stream.
    pub fn new(session: &'a CameraSession, all_events: &'a [NormalizedLogEvent]) -> Result<Self> {
        Self::bounded(session, all_events, None)
    }

    /// Like [`Self::new`], but drops events at or after `horizon`.
    ///
    /// The horizon is where the next session of the same package begins;
    /// see [`session_horizons`].
    pub fn bounded(
        session: &'a CameraSession,
        all_events: &'a [NormalizedLogEvent],
        horizon: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if session.package_name.trim().is_empty() {
            return Err(AnalysisError::InvalidArgument(format!(
                "session {} has no package name",
                session.id
            )));
        }
        if session.end_time.is_some_and(|end| end < session.start_time) {
            return Err(AnalysisError::InvalidArgument(format!(
                "session {} ends before it starts",
                session.id
            )));
        }

        let upper = session
            .end_time
            .map(|end| end + Duration::seconds(SESSION_END_GRACE_SECS));
        let mut events: Vec<&NormalizedLogEvent> = all_events
            .iter()
            .filter(|e| e.timestamp >= session.start_time && upper.is_none_or(|u| e.timestamp <= u))
            .filter(|e| horizon.is_none_or(|h| e.timestamp < h))
            .collect();
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let package = session.package_name.as_str();
        let first_of = |event_type: EventType| {
            events
                .iter()
                .find(|e| e.event_type == event_type && e.is_for_package(package))
                .map(|e| e.timestamp)
        };
        let activity_resumed_at = first_of(EventType::ActivityResumed);
        let activity_paused_at = first_of(EventType::ActivityPaused);
        let foreground_services = pair_foreground_services(&events, package);

        let mut buckets: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, event) in events.iter().enumerate() {
            buckets.entry(event.timestamp.timestamp()).or_default().push(idx);
        }

        Ok(Self {
            session,
            events,
            activity_resumed_at,
            activity_paused_at,
            foreground_services,
            buckets,
        })
    }

    pub fn package_name(&self) -> &str {
        &self.session.package_name
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events within `window` of `at` (inclusive), ascending.
    pub fn events_near(
        &self,
        at: DateTime<Utc>,
        window: Duration,
    ) -> impl Iterator<Item = &'a NormalizedLogEvent> + '_ {
        let (lo, hi) = (at - window, at + window);
        let events = &self.events;
        self.buckets
            .range(lo.timestamp()..=hi.timestamp())
            .flat_map(move |(_, indices)| indices.iter().map(move |&i| events[i]))
            .filter(move |e| e.timestamp >= lo && e.timestamp <= hi)
    }

    /// Returns true if any foreground service whose class matches `is_relevant`
    /// was running at `timestamp`.
    pub fn service_running_at(
        &self,
        timestamp: DateTime<Utc>,
        is_relevant: impl Fn(&str) -> bool,
    ) -> bool {
        self.foreground_services
            .iter()
            .any(|fs| is_relevant(&fs.service_class) && fs.contains(timestamp))
    }
}

/// Convenience wrapper matching the provider's entry point.
pub fn create_context<'a>(
    session: &'a CameraSession,
    all_events: &'a [NormalizedLogEvent],
) -> Result<SessionContext<'a>> {
    SessionContext::new(session, all_events)
}

/// Start of the next session of the same package, per session.
///
/// An open session would otherwise see every later event of its package, and
/// the grace period of a closed one may reach into its successor.
pub fn session_horizons(sessions: &[CameraSession]) -> Vec<Option<DateTime<Utc>>> {
    sessions
        .iter()
        .map(|session| {
            sessions
                .iter()
                .filter(|other| {
                    other.start_time > session.start_time
                        && other.package_name.eq_ignore_ascii_case(&session.package_name)
                })
                .map(|other| other.start_time)
                .min()
        })
        .collect()
}

/// Pairs each service start of `package` with the earliest later stop of the same class.
fn pair_foreground_services(
    events: &[&NormalizedLogEvent],
    package: &str,
) -> Vec<ForegroundServiceInfo> {
    let mut used_stops = vec![false; events.len()];
    let mut services = Vec::new();

    for (idx, start) in events.iter().enumerate() {
        if start.event_type != EventType::ForegroundServiceStart || !start.is_for_package(package)
        {
            continue;
        }
        let Some(class) = start.first_attribute(SERVICE_CLASS_KEYS) else {
            continue;
        };

        let stop = events
            .iter()
            .enumerate()
            .skip(idx + 1)
            .find(|(j, e)| {
                !used_stops[*j]
                    && e.event_type == EventType::ForegroundServiceStop
                    && e.first_attribute(SERVICE_CLASS_KEYS).as_deref() == Some(class.as_str())
            })
            .map(|(j, e)| (j, e.timestamp));

        if let Some((j, _)) = stop {
            used_stops[j] = true;
        }
        services.push(ForegroundServiceInfo {
            service_class: class,
            start_time: start.timestamp,
            stop_time: stop.map(|(_, ts)| ts),
        });
    }

    services
}
