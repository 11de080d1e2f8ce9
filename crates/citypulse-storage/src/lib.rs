//! HTTP fetch utilities and the event store abstraction for CityPulse.
//!
//! The pipeline treats the durable store as an abstract keyed collection:
//! exact-match lookup by dedupe key, range lookups by source and city,
//! insert/update of whole records, and append-only runs/leads/imports.
//! [`MemoryStore`] backs tests and local runs; [`PgStore`] is the deployed
//! implementation.

pub mod http;
mod memory;
mod postgres;

use async_trait::async_trait;
use citypulse_core::{ImportRecord, ParseStatusError, ScrapeRun, StoredEvent, TicketLead};
use thiserror::Error;
use uuid::Uuid;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedResponse,
    HttpClientConfig, HttpFetcher, PageFetcher, RetryDisposition, BROWSER_USER_AGENT,
};
pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "citypulse-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event {0} not found")]
    NotFound(Uuid),
    #[error("duplicate dedupe key {0}")]
    DuplicateKey(String),
    #[error(transparent)]
    InvalidStatus(#[from] ParseStatusError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Keyed store contract required by the reconciler, sweeper, and web
/// surface. `dedupe_key` is a uniqueness constraint: lookups return at most
/// one record and a second insert with the same key fails.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<StoredEvent>, StoreError>;

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<StoredEvent>, StoreError>;

    /// All records for one source, soonest start first.
    async fn list_by_source(&self, source_name: &str) -> Result<Vec<StoredEvent>, StoreError>;

    /// All records for one city, soonest start first.
    async fn list_by_city(&self, city: &str) -> Result<Vec<StoredEvent>, StoreError>;

    async fn list_all(&self) -> Result<Vec<StoredEvent>, StoreError>;

    async fn insert(&self, record: StoredEvent) -> Result<(), StoreError>;

    async fn update(&self, record: &StoredEvent) -> Result<(), StoreError>;

    async fn create_run(&self, run: &ScrapeRun) -> Result<(), StoreError>;

    async fn latest_run(&self) -> Result<Option<ScrapeRun>, StoreError>;

    async fn create_lead(&self, lead: &TicketLead) -> Result<(), StoreError>;

    async fn create_import(&self, import: &ImportRecord) -> Result<(), StoreError>;
}
