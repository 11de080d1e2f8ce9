//! Pipeline orchestration: adapters → enrichment → reconciliation → sweep
//! → run ledger, once per invocation.

pub mod enrich;
pub mod reconcile;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use citypulse_adapters::{active_adapters, SourceAdapter};
use citypulse_core::{NormalizedEvent, ScrapeRun};
use citypulse_storage::{EventStore, HttpClientConfig, HttpFetcher, PageFetcher, BROWSER_USER_AGENT};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

pub use enrich::{enrich_images, DEFAULT_CONCURRENCY};
pub use reconcile::{default_grace, reconcile, sweep_source, ReconcileOutcome};

pub const CRATE_NAME: &str = "citypulse-ingest";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub enrich_concurrency: usize,
    /// Staleness grace window; `None` means the 6-hour default.
    pub grace: Option<Duration>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            http_timeout_secs: 20,
            enrich_concurrency: DEFAULT_CONCURRENCY,
            grace: None,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_agent: std::env::var("CITYPULSE_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("CITYPULSE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            enrich_concurrency: std::env::var("CITYPULSE_ENRICH_CONCURRENCY")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.enrich_concurrency),
            grace: std::env::var("CITYPULSE_GRACE_HOURS")
                .ok()
                .and_then(|value| value.parse::<i64>().ok())
                .map(Duration::hours),
        }
    }
}

/// One source's failure, surfaced in the run summary instead of discarded.
#[derive(Debug, Clone, Serialize)]
pub struct SourceError {
    pub source: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Candidates ingested across all sources; zero is a valid empty run.
    pub total: usize,
    pub sources: Vec<String>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub swept: usize,
    pub errors: Vec<SourceError>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

pub struct IngestPipeline {
    store: Arc<dyn EventStore>,
    http: Arc<HttpFetcher>,
    pages: Arc<dyn PageFetcher>,
    adapters: Vec<Box<dyn SourceAdapter>>,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn EventStore>, config: IngestConfig) -> Result<Self> {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig {
            timeout: StdDuration::from_secs(config.http_timeout_secs),
            user_agent: config.user_agent.clone(),
            ..Default::default()
        })?);
        Ok(Self {
            store,
            pages: http.clone(),
            http,
            adapters: active_adapters(),
            config,
        })
    }

    pub fn with_adapters(mut self, adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_page_fetcher(mut self, pages: Arc<dyn PageFetcher>) -> Self {
        self.pages = pages;
        self
    }

    /// Run the whole pipeline once. Adapter failures are isolated per
    /// source; a run with zero candidates short-circuits before any store
    /// write. Assumes runs are serialized externally.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut events: Vec<NormalizedEvent> = Vec::new();
        let mut errors = Vec::new();
        let mut sources = Vec::new();

        for adapter in &self.adapters {
            let source = adapter.source_name().to_string();
            sources.push(source.clone());
            match adapter.fetch(&self.http).await {
                Ok(mut scraped) => {
                    info!(%run_id, %source, count = scraped.len(), "source scraped");
                    events.append(&mut scraped);
                }
                Err(err) => {
                    warn!(%run_id, %source, error = %err, "source failed");
                    errors.push(SourceError {
                        source,
                        message: err.to_string(),
                    });
                }
            }
        }

        if events.is_empty() {
            info!(%run_id, "no candidates scraped; skipping store writes");
            return Ok(RunSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                total: 0,
                sources,
                inserted: 0,
                updated: 0,
                unchanged: 0,
                swept: 0,
                errors,
            });
        }

        let events = enrich_images(
            Arc::clone(&self.pages),
            events,
            self.config.enrich_concurrency,
        )
        .await;
        let total = events.len();

        let mut inserted = 0;
        let mut updated = 0;
        let mut unchanged = 0;
        for event in &events {
            match reconcile(self.store.as_ref(), event, Utc::now()).await? {
                ReconcileOutcome::Inserted => inserted += 1,
                ReconcileOutcome::Updated => updated += 1,
                ReconcileOutcome::Unchanged => unchanged += 1,
            }
        }

        let mut swept = 0;
        for source in &sources {
            swept +=
                sweep_source(self.store.as_ref(), source, started_at, self.config.grace, Utc::now())
                    .await?;
        }

        let finished_at = Utc::now();
        self.store
            .create_run(&ScrapeRun {
                started_at,
                finished_at,
                total: total as u64,
                sources: sources.clone(),
            })
            .await?;

        info!(%run_id, total, inserted, updated, unchanged, swept, "run complete");
        Ok(RunSummary {
            run_id,
            started_at,
            finished_at,
            total,
            sources,
            inserted,
            updated,
            unchanged,
            swept,
            errors,
        })
    }
}
