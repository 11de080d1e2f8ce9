//! Core domain model for CityPulse scraped events.
//!
//! Everything downstream (adapters, enricher, reconciler, store) trades in
//! the types defined here. The two derived identity fields are computed by
//! pure functions in this crate: [`build_dedupe_key`] decides which stored
//! record a candidate matches, and [`content_hash`] fingerprints the
//! normalized fields so the reconciler can detect meaningful change.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "citypulse-core";

/// Lifecycle state of a scraped event.
///
/// The store boundary rejects anything outside this closed set; free-form
/// status strings from older data fail [`EventStatus::from_str`] rather
/// than round-tripping silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Updated,
    Inactive,
    Imported,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Updated => "updated",
            EventStatus::Inactive => "inactive",
            EventStatus::Imported => "imported",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized event status {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for EventStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(EventStatus::New),
            "updated" => Ok(EventStatus::Updated),
            "inactive" => Ok(EventStatus::Inactive),
            "imported" => Ok(EventStatus::Imported),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Cumulative set of states an event has passed through.
///
/// Duplicates collapse and insertion order is irrelevant; serialized form is
/// a plain array of status strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusTagSet(BTreeSet<EventStatus>);

impl StatusTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: EventStatus) {
        self.0.insert(tag);
    }

    pub fn contains(&self, tag: EventStatus) -> bool {
        self.0.contains(&tag)
    }

    /// Union with a single tag, returning a new set.
    pub fn with(&self, tag: EventStatus) -> Self {
        let mut next = self.clone();
        next.0.insert(tag);
        next
    }

    /// Difference with a single tag, returning a new set.
    pub fn without(&self, tag: EventStatus) -> Self {
        let mut next = self.clone();
        next.0.remove(&tag);
        next
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EventStatus> + '_ {
        self.0.iter().copied()
    }

    pub fn as_strings(&self) -> Vec<String> {
        self.0.iter().map(|tag| tag.as_str().to_string()).collect()
    }
}

impl From<EventStatus> for StatusTagSet {
    fn from(tag: EventStatus) -> Self {
        let mut set = Self::default();
        set.insert(tag);
        set
    }
}

impl FromIterator<EventStatus> for StatusTagSet {
    fn from_iter<I: IntoIterator<Item = EventStatus>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Vec<String>> for StatusTagSet {
    type Error = ParseStatusError;

    fn try_from(values: Vec<String>) -> Result<Self, Self::Error> {
        values
            .iter()
            .map(|value| value.parse::<EventStatus>())
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

/// An event freshly extracted from one source in one run, before identity
/// derivation. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvent {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// IANA timezone name of the metro area the source serves.
    pub timezone: String,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub country: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub source_name: String,
    pub source_url: String,
    pub source_event_id: Option<String>,
}

/// A candidate with its derived identity fields attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub timezone: String,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub city: String,
    pub country: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub source_name: String,
    pub source_url: String,
    pub source_event_id: Option<String>,
    pub dedupe_key: String,
    pub content_hash: String,
}

impl NormalizedEvent {
    pub fn from_candidate(candidate: CandidateEvent) -> Self {
        let dedupe_key = build_dedupe_key(
            &candidate.source_name,
            candidate.source_event_id.as_deref(),
            &candidate.source_url,
        );
        let content_hash = content_hash(&candidate);
        Self {
            title: candidate.title,
            description: candidate.description,
            start: candidate.start,
            end: candidate.end,
            timezone: candidate.timezone,
            venue_name: candidate.venue_name,
            address: candidate.address,
            city: candidate.city,
            country: candidate.country,
            category: candidate.category,
            tags: candidate.tags,
            image_url: candidate.image_url,
            source_name: candidate.source_name,
            source_url: candidate.source_url,
            source_event_id: candidate.source_event_id,
            dedupe_key,
            content_hash,
        }
    }

    /// Replace the image and recompute the fingerprint. A stale hash after
    /// enrichment would blind the reconciler's change detection.
    pub fn with_image(mut self, image_url: String) -> Self {
        self.image_url = Some(image_url);
        self.content_hash = content_hash(&self.as_candidate());
        self
    }

    fn as_candidate(&self) -> CandidateEvent {
        CandidateEvent {
            title: self.title.clone(),
            description: self.description.clone(),
            start: self.start,
            end: self.end,
            timezone: self.timezone.clone(),
            venue_name: self.venue_name.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            country: self.country.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            image_url: self.image_url.clone(),
            source_name: self.source_name.clone(),
            source_url: self.source_url.clone(),
            source_event_id: self.source_event_id.clone(),
        }
    }
}

/// Stable identity for upserts: native event id when the source exposes one,
/// source URL otherwise. An empty native id counts as absent.
pub fn build_dedupe_key(
    source_name: &str,
    source_event_id: Option<&str>,
    source_url: &str,
) -> String {
    match source_event_id {
        Some(id) if !id.is_empty() => format!("{source_name}:{id}"),
        _ => format!("{source_name}:{source_url}"),
    }
}

/// Deterministic SHA-256 fingerprint over the normalized fields, in fixed
/// declaration order. Housekeeping timestamps and the hash itself never
/// participate. `None` and `Some("")` hash differently.
pub fn content_hash(candidate: &CandidateEvent) -> String {
    let mut hasher = Sha256::new();
    hash_field(&mut hasher, &candidate.title);
    hash_field(&mut hasher, &candidate.description);
    hash_field(&mut hasher, &candidate.start.to_rfc3339());
    hash_opt(&mut hasher, candidate.end.map(|end| end.to_rfc3339()).as_deref());
    hash_field(&mut hasher, &candidate.timezone);
    hash_opt(&mut hasher, candidate.venue_name.as_deref());
    hash_opt(&mut hasher, candidate.address.as_deref());
    hash_field(&mut hasher, &candidate.city);
    hash_field(&mut hasher, &candidate.country);
    hash_opt(&mut hasher, candidate.category.as_deref());
    for tag in &candidate.tags {
        hash_field(&mut hasher, tag);
    }
    hash_opt(&mut hasher, candidate.image_url.as_deref());
    hash_field(&mut hasher, &candidate.source_name);
    hash_field(&mut hasher, &candidate.source_url);
    hash_opt(&mut hasher, candidate.source_event_id.as_deref());
    hex::encode(hasher.finalize())
}

fn hash_field(hasher: &mut Sha256, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update([0x1f]);
}

fn hash_opt(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(value) => {
            hasher.update([1u8]);
            hash_field(hasher, value);
        }
        None => hasher.update([0u8]),
    }
}

/// Durable record owned by the store: normalized fields plus lifecycle.
/// Created on first sighting of a dedupe key, mutated on every subsequent
/// sighting or sweep, never deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: NormalizedEvent,
    pub status: EventStatus,
    pub status_tags: StatusTagSet,
    pub last_scraped_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub imported_at: Option<DateTime<Utc>>,
    pub imported_by: Option<String>,
    pub import_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of one pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Items ingested, across all sources.
    pub total: u64,
    /// Sources attempted, successful or not.
    pub sources: Vec<String>,
}

/// Email/consent capture against a scraped event; independent of the
/// lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketLead {
    pub id: Uuid,
    pub event_id: Uuid,
    pub email: String,
    pub consent: bool,
    pub source_url: String,
    pub created_at: DateTime<Utc>,
}

/// Audit record appended whenever an event is imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub imported_at: DateTime<Utc>,
    pub imported_by: String,
    pub import_notes: Option<String>,
}
