//! Duplicate collapsing across overlapping log sources.
//!
//! # Algorithm Summary
//!
//! 1. Sort items by timestamp and compare each pair that lies within the
//!    widest strategy window
//! 2. Strategies are tried in order; the first match links the pair
//! 3. Linked pairs are merged transitively (union-find), so A~B and B~C puts
//!    A, B and C in one cluster even when A and C differ too much to match
//! 4. Each cluster keeps one representative: most attributes, then higher
//!    confidence, then earliest timestamp, then input order
//!
//! Captures additionally go through [`enforce_evidence_exclusivity`] so that
//! no evidence event backs two surviving captures.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::CameraCaptureEvent;
use crate::event::{NormalizedLogEvent, value_as_string};
use crate::event_type::EventType;
use crate::options::AnalysisOptions;
use crate::types::EventId;

/// Attribute keys that carry a camera or device identifier.
pub const CAMERA_ID_KEYS: &[&str] = &["camera_id", "cameraId", "camera", "device_id", "deviceId"];

/// Camera rule window.
pub const CAMERA_DEDUP_WINDOW_MS: i64 = 1_000;

/// Minimum attribute similarity for the time-based rule.
pub const MIN_JACCARD_SIMILARITY: f64 = 0.8;

pub const SHARED_EVIDENCE_REASON: &str = "shared decisive evidence";
pub const EVIDENCE_CLAIMED_REASON: &str = "all evidence claimed by stronger capture";

/// Anything that can be compared for duplication.
pub trait Deduplicatable {
    fn dedup_id(&self) -> &str;
    fn timestamp(&self) -> DateTime<Utc>;
    fn event_type(&self) -> EventType;
    fn package(&self) -> Option<String>;
    fn file_path(&self) -> Option<String>;
    fn attributes(&self) -> &BTreeMap<String, serde_json::Value>;

    /// Tie-breaker when picking a representative.
    fn confidence(&self) -> f32 {
        0.0
    }

    fn attribute_count(&self) -> usize {
        self.attributes().len()
    }

    /// Attribute value as a string, trying `keys` in order.
    fn first_attribute(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.attributes().get(*k).and_then(value_as_string))
    }
}

impl Deduplicatable for NormalizedLogEvent {
    fn dedup_id(&self) -> &str {
        self.id.as_str()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn package(&self) -> Option<String> {
        Self::package(self)
    }

    fn file_path(&self) -> Option<String> {
        Self::file_path(self)
    }

    fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }
}

impl Deduplicatable for CameraCaptureEvent {
    fn dedup_id(&self) -> &str {
        self.id.as_str()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.capture_time
    }

    fn event_type(&self) -> EventType {
        self.primary_type()
    }

    fn package(&self) -> Option<String> {
        Some(self.package_name.clone())
    }

    fn file_path(&self) -> Option<String> {
        self.file_path.clone()
    }

    fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    fn confidence(&self) -> f32 {
        self.confidence.value()
    }
}

/// Why two items were judged duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub similarity: f32,
    pub reason: String,
}

/// One similarity rule. Implementations must be symmetric.
pub trait DeduplicationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Largest timestamp gap this rule can ever accept.
    fn window(&self) -> Duration;

    fn compare(&self, a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> Option<DuplicateMatch>;

    fn is_duplicate(&self, a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> bool {
        self.compare(a, b).is_some()
    }
}

fn gap(a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> Duration {
    (a.timestamp() - b.timestamp()).abs()
}

/// Items naming two different files are two photos, however close in time.
fn distinct_files(a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> bool {
    matches!((a.file_path(), b.file_path()), (Some(pa), Some(pb)) if pa != pb)
}

/// Same camera hardware opened twice by one app within a second.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraDeduplicationStrategy;

impl DeduplicationStrategy for CameraDeduplicationStrategy {
    fn name(&self) -> &'static str {
        "camera"
    }

    fn window(&self) -> Duration {
        Duration::milliseconds(CAMERA_DEDUP_WINDOW_MS)
    }

    fn compare(&self, a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> Option<DuplicateMatch> {
        if a.event_type() != b.event_type() || gap(a, b) > self.window() || distinct_files(a, b) {
            return None;
        }
        if let (Some(pa), Some(pb)) = (a.package(), b.package()) {
            if !pa.eq_ignore_ascii_case(&pb) {
                return None;
            }
        }
        let ids = (a.first_attribute(CAMERA_ID_KEYS), b.first_attribute(CAMERA_ID_KEYS));
        let similarity = match ids {
            (Some(ia), Some(ib)) if ia != ib => return None,
            (Some(_), Some(_)) => 1.0,
            _ => 0.9,
        };
        Some(DuplicateMatch {
            similarity,
            reason: format!("same {} on one camera within {CAMERA_DEDUP_WINDOW_MS}ms", a.event_type()),
        })
    }
}

/// Near-simultaneous items with near-identical attributes.
#[derive(Debug, Clone, Copy)]
pub struct TimeBasedDeduplicationStrategy {
    threshold: Duration,
}

impl TimeBasedDeduplicationStrategy {
    pub const fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl Default for TimeBasedDeduplicationStrategy {
    fn default() -> Self {
        Self::new(Duration::milliseconds(AnalysisOptions::default().dedup_time_threshold_ms))
    }
}

impl DeduplicationStrategy for TimeBasedDeduplicationStrategy {
    fn name(&self) -> &'static str {
        "time"
    }

    fn window(&self) -> Duration {
        self.threshold
    }

    fn compare(&self, a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> Option<DuplicateMatch> {
        if gap(a, b) > self.threshold || distinct_files(a, b) {
            return None;
        }
        let similarity = attribute_jaccard(a.attributes(), b.attributes());
        if similarity < MIN_JACCARD_SIMILARITY {
            return None;
        }
        #[expect(clippy::cast_possible_truncation, reason = "similarity is in [0, 1]")]
        let score = similarity as f32;
        Some(DuplicateMatch {
            similarity: score,
            reason: format!(
                "attributes {:.0}% similar within {}ms",
                similarity * 100.0,
                self.threshold.num_milliseconds()
            ),
        })
    }
}

/// Keys holding equal string values on both sides, over keys on either side.
/// Two empty maps share nothing and score 0.
#[expect(clippy::cast_precision_loss, reason = "attribute counts are small")]
pub fn attribute_jaccard(
    a: &BTreeMap<String, serde_json::Value>,
    b: &BTreeMap<String, serde_json::Value>,
) -> f64 {
    let union: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    if union.is_empty() {
        return 0.0;
    }
    let matching = a
        .iter()
        .filter(|(k, v)| {
            b.get(*k)
                .is_some_and(|other| value_as_string(v) == value_as_string(other))
        })
        .count();
    matching as f64 / union.len() as f64
}

/// A collapsed group of duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationInfo {
    pub representative_id: String,
    pub duplicate_ids: Vec<String>,
    pub reason: String,
    /// Weakest link that joined the cluster.
    pub similarity: f32,
}

/// Disjoint-set forest over item indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index as root keeps cluster ids stable
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Runs the ordered similarity rules over a set of items.
pub struct EventDeduplicator {
    strategies: Vec<Box<dyn DeduplicationStrategy>>,
}

impl std::fmt::Debug for EventDeduplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("EventDeduplicator")
            .field("strategies", &names)
            .finish()
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::from_options(&AnalysisOptions::default())
    }
}

impl EventDeduplicator {
    pub fn new(strategies: Vec<Box<dyn DeduplicationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Camera rule first, then the time rule at the configured threshold.
    pub fn from_options(options: &AnalysisOptions) -> Self {
        Self::new(vec![
            Box::new(CameraDeduplicationStrategy),
            Box::new(TimeBasedDeduplicationStrategy::new(Duration::milliseconds(
                options.dedup_time_threshold_ms,
            ))),
        ])
    }

    /// First matching rule for a pair, if any.
    pub fn compare(&self, a: &dyn Deduplicatable, b: &dyn Deduplicatable) -> Option<DuplicateMatch> {
        self.strategies.iter().find_map(|s| s.compare(a, b))
    }

    /// Clusters duplicates. Items outside every cluster are not reported.
    pub fn find_duplicates<T: Deduplicatable>(&self, items: &[T]) -> Vec<DeduplicationInfo> {
        let Some(max_window) = self.strategies.iter().map(|s| s.window()).max() else {
            return Vec::new();
        };

        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by_key(|&i| (items[i].timestamp(), i));

        let mut forest = UnionFind::new(items.len());
        // Every matched pair, in discovery order
        let mut links: Vec<(usize, usize, DuplicateMatch)> = Vec::new();

        for (pos, &i) in order.iter().enumerate() {
            for &j in &order[pos + 1..] {
                if items[j].timestamp() - items[i].timestamp() > max_window {
                    break;
                }
                if let Some(m) = self.compare(&items[i], &items[j]) {
                    forest.union(i, j);
                    links.push((i, j, m));
                }
            }
        }

        let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..items.len() {
            clusters.entry(forest.find(i)).or_default().push(i);
        }

        let mut infos = Vec::new();
        for (root, members) in clusters {
            if members.len() < 2 {
                continue;
            }
            let cluster_links = links.iter().filter(|(a, _, _)| forest.find(*a) == root);
            let mut reason = String::new();
            let mut similarity = 1.0_f32;
            for (_, _, m) in cluster_links {
                if reason.is_empty() {
                    reason.clone_from(&m.reason);
                }
                similarity = similarity.min(m.similarity);
            }

            let representative = pick_representative(items, &members);
            let duplicate_ids: Vec<String> = members
                .iter()
                .filter(|&&i| i != representative)
                .map(|&i| items[i].dedup_id().to_string())
                .collect();
            debug!(
                representative = items[representative].dedup_id(),
                duplicates = duplicate_ids.len(),
                %reason,
                "collapsed duplicates"
            );
            infos.push(DeduplicationInfo {
                representative_id: items[representative].dedup_id().to_string(),
                duplicate_ids,
                reason,
                similarity,
            });
        }
        infos
    }

    /// Drops every non-representative item; survivors keep input order.
    pub fn deduplicate<T: Deduplicatable>(&self, items: Vec<T>) -> (Vec<T>, Vec<DeduplicationInfo>) {
        let infos = self.find_duplicates(&items);
        let dropped: BTreeSet<&str> = infos
            .iter()
            .flat_map(|info| info.duplicate_ids.iter().map(String::as_str))
            .collect();
        let keep: Vec<bool> = items
            .iter()
            .map(|item| !dropped.contains(item.dedup_id()))
            .collect();
        let survivors = items
            .into_iter()
            .zip(keep)
            .filter_map(|(item, keep)| keep.then_some(item))
            .collect();
        (survivors, infos)
    }
}

fn pick_representative<T: Deduplicatable>(items: &[T], members: &[usize]) -> usize {
    let mut best = members[0];
    for &i in &members[1..] {
        let (a, b) = (&items[i], &items[best]);
        let better = a
            .attribute_count()
            .cmp(&b.attribute_count())
            .then_with(|| a.confidence().total_cmp(&b.confidence()))
            .then_with(|| b.timestamp().cmp(&a.timestamp()))
            .then_with(|| best.cmp(&i))
            .is_gt();
        if better {
            best = i;
        }
    }
    best
}

/// Gives each evidence event to at most one capture.
///
/// Captures are visited by descending score. A capture whose decisive
/// evidence is already claimed collapses into the claimant. Supporting
/// evidence already claimed is withheld; an estimated capture left with no
/// evidence at all collapses into the capture that claimed it. Every record
/// names a survivor as representative. Survivors keep input order.
pub fn enforce_evidence_exclusivity(
    captures: Vec<CameraCaptureEvent>,
) -> (Vec<CameraCaptureEvent>, Vec<DeduplicationInfo>) {
    let mut order: Vec<usize> = (0..captures.len()).collect();
    order.sort_by(|&a, &b| {
        captures[b]
            .confidence
            .value()
            .total_cmp(&captures[a].confidence.value())
            .then_with(|| captures[a].capture_time.cmp(&captures[b].capture_time))
            .then_with(|| a.cmp(&b))
    });

    let mut claimed: BTreeMap<EventId, usize> = BTreeMap::new();
    let mut slots: Vec<Option<CameraCaptureEvent>> = captures.into_iter().map(Some).collect();
    let mut infos = Vec::new();

    for i in order {
        let Some(mut capture) = slots[i].take() else {
            continue;
        };
        if let Some(decisive) = &capture.decisive_evidence_id {
            if let Some(&owner) = claimed.get(decisive) {
                debug!(capture = %capture.id, owner, "decisive evidence already claimed");
                infos.extend(collapse_into(&slots, owner, &capture, SHARED_EVIDENCE_REASON));
                continue;
            }
        }

        let claimant = capture
            .supporting_evidence_ids
            .iter()
            .find_map(|id| claimed.get(id).copied());
        capture.supporting_evidence_ids.retain(|id| !claimed.contains_key(id));
        capture.source_event_ids.retain(|id| !claimed.contains_key(id));

        if capture.is_estimated && capture.supporting_evidence_ids.is_empty() {
            debug!(capture = %capture.id, "estimated capture lost all evidence");
            if let Some(owner) = claimant {
                infos.extend(collapse_into(&slots, owner, &capture, EVIDENCE_CLAIMED_REASON));
            }
            continue;
        }

        for id in capture.evidence_ids() {
            claimed.insert(id.clone(), i);
        }
        slots[i] = Some(capture);
    }

    (slots.into_iter().flatten().collect(), infos)
}

/// Record for `dropped` collapsing into the survivor in `slots[owner]`.
fn collapse_into(
    slots: &[Option<CameraCaptureEvent>],
    owner: usize,
    dropped: &CameraCaptureEvent,
    reason: &str,
) -> Option<DeduplicationInfo> {
    let survivor = slots[owner].as_ref()?;
    Some(DeduplicationInfo {
        representative_id: survivor.id.to_string(),
        duplicate_ids: vec![dropped.id.to_string()],
        reason: reason.to_string(),
        similarity: 1.0,
    })
}
