//! Postgres-backed [`EventStore`] using runtime sqlx queries.

use async_trait::async_trait;
use citypulse_core::{
    EventStatus, ImportRecord, NormalizedEvent, ScrapeRun, StatusTagSet, StoredEvent, TicketLead,
};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::{EventStore, StoreError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scraped_events (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    start_at TIMESTAMPTZ NOT NULL,
    end_at TIMESTAMPTZ,
    timezone TEXT NOT NULL,
    venue_name TEXT,
    address TEXT,
    city TEXT NOT NULL,
    country TEXT NOT NULL,
    category TEXT,
    tags TEXT[] NOT NULL DEFAULT '{}',
    image_url TEXT,
    source_name TEXT NOT NULL,
    source_url TEXT NOT NULL,
    source_event_id TEXT,
    dedupe_key TEXT NOT NULL UNIQUE,
    content_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    status_tags TEXT[] NOT NULL DEFAULT '{}',
    last_scraped_at TIMESTAMPTZ NOT NULL,
    last_seen_at TIMESTAMPTZ NOT NULL,
    imported_at TIMESTAMPTZ,
    imported_by TEXT,
    import_notes TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS scraped_events_by_city ON scraped_events (city);
CREATE INDEX IF NOT EXISTS scraped_events_by_source ON scraped_events (source_name);
CREATE INDEX IF NOT EXISTS scraped_events_by_status ON scraped_events (status);
CREATE INDEX IF NOT EXISTS scraped_events_by_start ON scraped_events (start_at);

CREATE TABLE IF NOT EXISTS scrape_runs (
    id BIGSERIAL PRIMARY KEY,
    started_at TIMESTAMPTZ NOT NULL,
    finished_at TIMESTAMPTZ NOT NULL,
    total BIGINT NOT NULL,
    sources TEXT[] NOT NULL
);

CREATE INDEX IF NOT EXISTS scrape_runs_by_started ON scrape_runs (started_at);

CREATE TABLE IF NOT EXISTS ticket_leads (
    id UUID PRIMARY KEY,
    event_id UUID NOT NULL REFERENCES scraped_events (id),
    email TEXT NOT NULL,
    consent BOOLEAN NOT NULL,
    source_url TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS event_imports (
    id UUID PRIMARY KEY,
    event_id UUID NOT NULL REFERENCES scraped_events (id),
    imported_at TIMESTAMPTZ NOT NULL,
    imported_by TEXT NOT NULL,
    import_notes TEXT
);
"#;

const EVENT_COLUMNS: &str = "id, title, description, start_at, end_at, timezone, venue_name, \
address, city, country, category, tags, image_url, source_name, source_url, source_event_id, \
dedupe_key, content_hash, status, status_tags, last_scraped_at, last_seen_at, imported_at, \
imported_by, import_notes, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotently create tables and indexes.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

fn event_from_row(row: &PgRow) -> Result<StoredEvent, StoreError> {
    let status: String = row.try_get("status")?;
    let status_tags: Vec<String> = row.try_get("status_tags")?;
    Ok(StoredEvent {
        id: row.try_get("id")?,
        event: NormalizedEvent {
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            start: row.try_get("start_at")?,
            end: row.try_get("end_at")?,
            timezone: row.try_get("timezone")?,
            venue_name: row.try_get("venue_name")?,
            address: row.try_get("address")?,
            city: row.try_get("city")?,
            country: row.try_get("country")?,
            category: row.try_get("category")?,
            tags: row.try_get("tags")?,
            image_url: row.try_get("image_url")?,
            source_name: row.try_get("source_name")?,
            source_url: row.try_get("source_url")?,
            source_event_id: row.try_get("source_event_id")?,
            dedupe_key: row.try_get("dedupe_key")?,
            content_hash: row.try_get("content_hash")?,
        },
        status: status.parse::<EventStatus>()?,
        status_tags: StatusTagSet::try_from(status_tags)?,
        last_scraped_at: row.try_get("last_scraped_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        imported_at: row.try_get("imported_at")?,
        imported_by: row.try_get("imported_by")?,
        import_notes: row.try_get("import_notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn run_from_row(row: &PgRow) -> Result<ScrapeRun, StoreError> {
    let total: i64 = row.try_get("total")?;
    Ok(ScrapeRun {
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        total: total.max(0) as u64,
        sources: row.try_get("sources")?,
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<StoredEvent>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scraped_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<StoredEvent>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scraped_events WHERE dedupe_key = $1"
        ))
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_by_source(&self, source_name: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scraped_events WHERE source_name = $1 ORDER BY start_at"
        ))
        .bind(source_name)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn list_by_city(&self, city: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scraped_events WHERE city = $1 ORDER BY start_at"
        ))
        .bind(city)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM scraped_events ORDER BY start_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn insert(&self, record: StoredEvent) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO scraped_events (id, title, description, start_at, end_at, timezone, \
             venue_name, address, city, country, category, tags, image_url, source_name, \
             source_url, source_event_id, dedupe_key, content_hash, status, status_tags, \
             last_scraped_at, last_seen_at, imported_at, imported_by, import_notes, created_at, \
             updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)",
        )
        .bind(record.id)
        .bind(&record.event.title)
        .bind(&record.event.description)
        .bind(record.event.start)
        .bind(record.event.end)
        .bind(&record.event.timezone)
        .bind(&record.event.venue_name)
        .bind(&record.event.address)
        .bind(&record.event.city)
        .bind(&record.event.country)
        .bind(&record.event.category)
        .bind(&record.event.tags)
        .bind(&record.event.image_url)
        .bind(&record.event.source_name)
        .bind(&record.event.source_url)
        .bind(&record.event.source_event_id)
        .bind(&record.event.dedupe_key)
        .bind(&record.event.content_hash)
        .bind(record.status.as_str())
        .bind(record.status_tags.as_strings())
        .bind(record.last_scraped_at)
        .bind(record.last_seen_at)
        .bind(record.imported_at)
        .bind(&record.imported_by)
        .bind(&record.import_notes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateKey(record.event.dedupe_key.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, record: &StoredEvent) -> Result<(), StoreError> {
        // created_at is deliberately absent: it is never touched after insert.
        let result = sqlx::query(
            "UPDATE scraped_events SET title = $2, description = $3, start_at = $4, end_at = $5, \
             timezone = $6, venue_name = $7, address = $8, city = $9, country = $10, \
             category = $11, tags = $12, image_url = $13, source_name = $14, source_url = $15, \
             source_event_id = $16, dedupe_key = $17, content_hash = $18, status = $19, \
             status_tags = $20, last_scraped_at = $21, last_seen_at = $22, imported_at = $23, \
             imported_by = $24, import_notes = $25, updated_at = $26 \
             WHERE id = $1",
        )
        .bind(record.id)
        .bind(&record.event.title)
        .bind(&record.event.description)
        .bind(record.event.start)
        .bind(record.event.end)
        .bind(&record.event.timezone)
        .bind(&record.event.venue_name)
        .bind(&record.event.address)
        .bind(&record.event.city)
        .bind(&record.event.country)
        .bind(&record.event.category)
        .bind(&record.event.tags)
        .bind(&record.event.image_url)
        .bind(&record.event.source_name)
        .bind(&record.event.source_url)
        .bind(&record.event.source_event_id)
        .bind(&record.event.dedupe_key)
        .bind(&record.event.content_hash)
        .bind(record.status.as_str())
        .bind(record.status_tags.as_strings())
        .bind(record.last_scraped_at)
        .bind(record.last_seen_at)
        .bind(record.imported_at)
        .bind(&record.imported_by)
        .bind(&record.import_notes)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    async fn create_run(&self, run: &ScrapeRun) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scrape_runs (started_at, finished_at, total, sources) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.total as i64)
        .bind(&run.sources)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_run(&self) -> Result<Option<ScrapeRun>, StoreError> {
        let row = sqlx::query(
            "SELECT started_at, finished_at, total, sources FROM scrape_runs \
             ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn create_lead(&self, lead: &TicketLead) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ticket_leads (id, event_id, email, consent, source_url, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(lead.id)
        .bind(lead.event_id)
        .bind(&lead.email)
        .bind(lead.consent)
        .bind(&lead.source_url)
        .bind(lead.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_import(&self, import: &ImportRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO event_imports (id, event_id, imported_at, imported_by, import_notes) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(import.id)
        .bind(import.event_id)
        .bind(import.imported_at)
        .bind(&import.imported_by)
        .bind(&import.import_notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
