//! Source adapters: one per external listing site.
//!
//! Every adapter fetches a single fixed listing URL, extracts event cards
//! with site-specific selectors, independently extracts embedded JSON-LD
//! `Event` nodes, and emits [`NormalizedEvent`]s. Duplicates across the two
//! extraction paths are expected — the reconciler collapses them by dedupe
//! key. Candidates missing a title, start time, or URL are dropped
//! silently; that is filtering, not failure.

pub mod base;
pub mod datetime;
pub mod detail;
pub mod jsonld;

mod eventbrite;
mod meetup;
mod timeout_sydney;
mod whats_on;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use citypulse_core::{CandidateEvent, NormalizedEvent};
use citypulse_storage::{FetchError, HttpFetcher};
use thiserror::Error;

pub use eventbrite::Eventbrite;
pub use meetup::Meetup;
pub use timeout_sydney::TimeOutSydney;
pub use whats_on::WhatsOnSydney;

pub const CRATE_NAME: &str = "citypulse-adapters";

/// Single-metro deployment: every adapter serves the same area.
pub const DEFAULT_CITY: &str = "Sydney";
pub const DEFAULT_COUNTRY: &str = "Australia";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Australia::Sydney;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0}")]
    Message(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_name(&self) -> &'static str;
    fn listing_url(&self) -> &'static str;

    /// Fetch and parse the listing page. A non-2xx response or network
    /// error is a hard failure for this adapter only.
    async fn fetch(&self, http: &HttpFetcher) -> Result<Vec<NormalizedEvent>, AdapterError>;
}

pub fn active_adapters() -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(Eventbrite),
        Box::new(Meetup),
        Box::new(TimeOutSydney),
        Box::new(WhatsOnSydney),
    ]
}

pub fn source_names() -> Vec<String> {
    active_adapters()
        .iter()
        .map(|adapter| adapter.source_name().to_string())
        .collect()
}

/// Assemble a normalized Sydney event from parsed card fields. Description
/// falls back to the title upstream; category/tags are not surfaced by any
/// of the current listing pages.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_sydney_event(
    title: String,
    description: String,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    venue_name: Option<String>,
    address: Option<String>,
    image_url: Option<String>,
    source_name: &str,
    source_url: String,
    source_event_id: Option<String>,
) -> NormalizedEvent {
    NormalizedEvent::from_candidate(CandidateEvent {
        title,
        description,
        start,
        end,
        timezone: DEFAULT_TIMEZONE.name().to_string(),
        venue_name,
        address,
        city: DEFAULT_CITY.to_string(),
        country: DEFAULT_COUNTRY.to_string(),
        category: None,
        tags: Vec::new(),
        image_url,
        source_name: source_name.to_string(),
        source_url,
        source_event_id,
    })
}
