//! Axum JSON surface for CityPulse: the scheduled scrape trigger plus the
//! read/write interfaces the dashboard and public pages consume.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use citypulse_core::{EventStatus, ImportRecord, StoredEvent, TicketLead};
use citypulse_ingest::IngestPipeline;
use citypulse_storage::EventStore;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "citypulse-web";

const DEFAULT_CITY: &str = "Sydney";
const PUBLIC_LIST_LIMIT: usize = 60;
const DASHBOARD_LIST_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    /// Absent when store configuration was missing at startup; the trigger
    /// then fails with a configuration error before any scraping.
    pub pipeline: Option<Arc<IngestPipeline>>,
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        pipeline: Option<Arc<IngestPipeline>>,
        cron_secret: Option<String>,
    ) -> Self {
        Self {
            store,
            pipeline,
            cron_secret,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/cron/scrape", get(cron_scrape_handler))
        .route("/events/public", get(public_events_handler))
        .route("/events/{id}", get(event_detail_handler))
        .route("/events/{id}/import", post(import_event_handler))
        .route("/events/{id}/leads", post(create_lead_handler))
        .route("/dashboard/events", get(dashboard_events_handler))
        .route("/dashboard/status", get(dashboard_status_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// `true` when no secret is configured, or the Authorization header is
/// exactly `Bearer <secret>`.
fn is_authorized(secret: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == format!("Bearer {secret}"))
        .unwrap_or(false)
}

#[derive(Debug, Serialize)]
struct CronResponse {
    message: String,
    scraped: usize,
    sources: Vec<String>,
    errors: Vec<citypulse_ingest::SourceError>,
}

async fn cron_scrape_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !is_authorized(state.cron_secret.as_deref(), &headers) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let Some(pipeline) = &state.pipeline else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Missing store configuration",
        )
            .into_response();
    };

    match pipeline.run_once().await {
        Ok(summary) => {
            let message = if summary.is_empty() {
                "No events scraped".to_string()
            } else {
                format!("Scraped {} events", summary.total)
            };
            Json(CronResponse {
                message,
                scraped: summary.total,
                sources: summary.sources,
                errors: summary.errors,
            })
            .into_response()
        }
        Err(err) => server_error(err),
    }
}

#[derive(Debug, Deserialize, Default)]
struct PublicEventsQuery {
    city: Option<String>,
    limit: Option<usize>,
}

async fn public_events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PublicEventsQuery>,
) -> Response {
    let city = query.city.unwrap_or_else(|| DEFAULT_CITY.to_string());
    let now = Utc::now();
    match state.store.list_by_city(&city).await {
        Ok(events) => {
            let upcoming: Vec<_> = events
                .into_iter()
                .filter(|record| record.event.start >= now)
                .take(query.limit.unwrap_or(PUBLIC_LIST_LIMIT))
                .collect();
            Json(upcoming).into_response()
        }
        Err(err) => server_error(err.into()),
    }
}

#[derive(Debug, Deserialize, Default)]
struct DashboardEventsQuery {
    city: Option<String>,
    query: Option<String>,
    status: Option<String>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

async fn dashboard_events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardEventsQuery>,
) -> Response {
    // Unknown status values are rejected at the boundary, not matched as
    // free-form strings.
    let status = match query.status.as_deref().map(str::parse::<EventStatus>) {
        Some(Ok(status)) => Some(status),
        Some(Err(err)) => {
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
        None => None,
    };

    let city = query.city.unwrap_or_else(|| DEFAULT_CITY.to_string());
    let now = Utc::now();
    let events = match state.store.list_by_city(&city).await {
        Ok(events) => events,
        Err(err) => return server_error(err.into()),
    };

    let needle = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let filtered: Vec<_> = events
        .into_iter()
        .filter(|record| record.event.start >= now)
        .filter(|record| status.is_none_or(|status| record.status_tags.contains(status)))
        .filter(|record| query.start_date.is_none_or(|from| record.event.start >= from))
        .filter(|record| query.end_date.is_none_or(|until| record.event.start <= until))
        .filter(|record| {
            needle.as_deref().is_none_or(|needle| {
                let haystack = [
                    Some(record.event.title.as_str()),
                    Some(record.event.description.as_str()),
                    record.event.venue_name.as_deref(),
                    record.event.address.as_deref(),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
                haystack.contains(needle)
            })
        })
        .take(query.limit.unwrap_or(DASHBOARD_LIST_LIMIT))
        .collect();

    Json(filtered).into_response()
}

async fn event_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.store.get(id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Event not found").into_response(),
        Err(err) => server_error(err.into()),
    }
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    imported_by: String,
    import_notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImportResponse {
    success: bool,
}

async fn import_event_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ImportRequest>,
) -> Response {
    let record = match state.store.get(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return (StatusCode::NOT_FOUND, "Event not found").into_response(),
        Err(err) => return server_error(err.into()),
    };

    let now = Utc::now();
    let import = ImportRecord {
        id: Uuid::new_v4(),
        event_id: record.id,
        imported_at: now,
        imported_by: body.imported_by.clone(),
        import_notes: body.import_notes.clone(),
    };
    if let Err(err) = state.store.create_import(&import).await {
        return server_error(err.into());
    }

    let updated = StoredEvent {
        status: EventStatus::Imported,
        status_tags: record.status_tags.with(EventStatus::Imported),
        imported_at: Some(now),
        imported_by: Some(body.imported_by),
        import_notes: body.import_notes,
        updated_at: now,
        ..record
    };
    if let Err(err) = state.store.update(&updated).await {
        return server_error(err.into());
    }

    Json(ImportResponse { success: true }).into_response()
}

#[derive(Debug, Deserialize)]
struct LeadRequest {
    email: String,
    consent: bool,
}

#[derive(Debug, Serialize)]
struct LeadResponse {
    success: bool,
    redirect_url: String,
}

async fn create_lead_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<LeadRequest>,
) -> Response {
    let record = match state.store.get(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return (StatusCode::NOT_FOUND, "Event not found").into_response(),
        Err(err) => return server_error(err.into()),
    };

    let lead = TicketLead {
        id: Uuid::new_v4(),
        event_id: record.id,
        email: body.email,
        consent: body.consent,
        source_url: record.event.source_url.clone(),
        created_at: Utc::now(),
    };
    if let Err(err) = state.store.create_lead(&lead).await {
        return server_error(err.into());
    }

    Json(LeadResponse {
        success: true,
        redirect_url: record.event.source_url,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct StatusCounts {
    total: usize,
    new: usize,
    updated: usize,
    inactive: usize,
    imported: usize,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    latest_run: Option<citypulse_core::ScrapeRun>,
    counts: StatusCounts,
    minutes_since_last_run: Option<i64>,
}

async fn dashboard_status_handler(State(state): State<Arc<AppState>>) -> Response {
    let events = match state.store.list_all().await {
        Ok(events) => events,
        Err(err) => return server_error(err.into()),
    };
    let latest_run = match state.store.latest_run().await {
        Ok(run) => run,
        Err(err) => return server_error(err.into()),
    };

    let counts = StatusCounts {
        total: events.len(),
        new: count_tag(&events, EventStatus::New),
        updated: count_tag(&events, EventStatus::Updated),
        inactive: count_tag(&events, EventStatus::Inactive),
        imported: count_tag(&events, EventStatus::Imported),
    };

    let minutes_since_last_run = latest_run.as_ref().map(|run| {
        let elapsed = Utc::now() - run.finished_at;
        elapsed.num_minutes().max(0)
    });

    Json(StatusResponse {
        latest_run,
        counts,
        minutes_since_last_run,
    })
    .into_response()
}

fn count_tag(events: &[StoredEvent], tag: EventStatus) -> usize {
    events
        .iter()
        .filter(|record| record.status_tags.contains(tag))
        .count()
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Server error: {err}"),
    )
        .into_response()
}
