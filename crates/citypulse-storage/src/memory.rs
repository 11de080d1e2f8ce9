//! In-memory [`EventStore`] for tests and local runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use citypulse_core::{ImportRecord, ScrapeRun, StoredEvent, TicketLead};
use uuid::Uuid;

use crate::{EventStore, StoreError};

#[derive(Debug, Default)]
struct MemoryInner {
    events: HashMap<Uuid, StoredEvent>,
    runs: Vec<ScrapeRun>,
    leads: Vec<TicketLead>,
    imports: Vec<ImportRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("store mutex poisoned")
    }

    pub fn run_count(&self) -> usize {
        self.lock().runs.len()
    }

    pub fn lead_count(&self) -> usize {
        self.lock().leads.len()
    }

    pub fn import_count(&self) -> usize {
        self.lock().imports.len()
    }
}

fn sorted_by_start(mut events: Vec<StoredEvent>) -> Vec<StoredEvent> {
    events.sort_by_key(|record| record.event.start);
    events
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<StoredEvent>, StoreError> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<StoredEvent>, StoreError> {
        Ok(self
            .lock()
            .events
            .values()
            .find(|record| record.event.dedupe_key == dedupe_key)
            .cloned())
    }

    async fn list_by_source(&self, source_name: &str) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(sorted_by_start(
            self.lock()
                .events
                .values()
                .filter(|record| record.event.source_name == source_name)
                .cloned()
                .collect(),
        ))
    }

    async fn list_by_city(&self, city: &str) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(sorted_by_start(
            self.lock()
                .events
                .values()
                .filter(|record| record.event.city == city)
                .cloned()
                .collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<StoredEvent>, StoreError> {
        Ok(sorted_by_start(self.lock().events.values().cloned().collect()))
    }

    async fn insert(&self, record: StoredEvent) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner
            .events
            .values()
            .any(|existing| existing.event.dedupe_key == record.event.dedupe_key)
        {
            return Err(StoreError::DuplicateKey(record.event.dedupe_key.clone()));
        }
        inner.events.insert(record.id, record);
        Ok(())
    }

    async fn update(&self, record: &StoredEvent) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.events.contains_key(&record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        inner.events.insert(record.id, record.clone());
        Ok(())
    }

    async fn create_run(&self, run: &ScrapeRun) -> Result<(), StoreError> {
        self.lock().runs.push(run.clone());
        Ok(())
    }

    async fn latest_run(&self) -> Result<Option<ScrapeRun>, StoreError> {
        Ok(self
            .lock()
            .runs
            .iter()
            .max_by_key(|run| run.started_at)
            .cloned())
    }

    async fn create_lead(&self, lead: &TicketLead) -> Result<(), StoreError> {
        self.lock().leads.push(lead.clone());
        Ok(())
    }

    async fn create_import(&self, import: &ImportRecord) -> Result<(), StoreError> {
        self.lock().imports.push(import.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use citypulse_core::{CandidateEvent, EventStatus, NormalizedEvent, StatusTagSet};

    fn stored(source_event_id: &str, start_hour: u32) -> StoredEvent {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).single().unwrap();
        let event = NormalizedEvent::from_candidate(CandidateEvent {
            title: format!("event {source_event_id}"),
            description: "desc".to_string(),
            start: Utc
                .with_ymd_and_hms(2026, 5, 2, start_hour, 0, 0)
                .single()
                .unwrap(),
            end: None,
            timezone: "Australia/Sydney".to_string(),
            venue_name: None,
            address: None,
            city: "Sydney".to_string(),
            country: "Australia".to_string(),
            category: None,
            tags: vec![],
            image_url: None,
            source_name: "Eventbrite".to_string(),
            source_url: format!("https://example.com/e/{source_event_id}"),
            source_event_id: Some(source_event_id.to_string()),
        });
        StoredEvent {
            id: Uuid::new_v4(),
            event,
            status: EventStatus::New,
            status_tags: StatusTagSet::from(EventStatus::New),
            last_scraped_at: now,
            last_seen_at: now,
            imported_at: None,
            imported_by: None,
            import_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dedupe_key_lookup_returns_at_most_one() {
        let store = MemoryStore::new();
        let record = stored("42", 10);
        let key = record.event.dedupe_key.clone();
        store.insert(record.clone()).await.unwrap();

        let found = store.find_by_dedupe_key(&key).await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert!(store.find_by_dedupe_key("Eventbrite:43").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        store.insert(stored("42", 10)).await.unwrap();
        let err = store.insert(stored("42", 11)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    async fn listings_are_sorted_by_start() {
        let store = MemoryStore::new();
        store.insert(stored("late", 20)).await.unwrap();
        store.insert(stored("early", 8)).await.unwrap();

        let listed = store.list_by_city("Sydney").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].event.start < listed[1].event.start);
    }

    #[tokio::test]
    async fn update_of_unknown_record_fails() {
        let store = MemoryStore::new();
        let record = stored("42", 10);
        let err = store.update(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn latest_run_picks_most_recent_start() {
        let store = MemoryStore::new();
        let older = ScrapeRun {
            started_at: Utc.with_ymd_and_hms(2026, 5, 1, 6, 0, 0).single().unwrap(),
            finished_at: Utc.with_ymd_and_hms(2026, 5, 1, 6, 5, 0).single().unwrap(),
            total: 10,
            sources: vec!["Eventbrite".to_string()],
        };
        let newer = ScrapeRun {
            started_at: Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).single().unwrap(),
            finished_at: Utc.with_ymd_and_hms(2026, 5, 1, 18, 4, 0).single().unwrap(),
            total: 12,
            sources: vec!["Eventbrite".to_string(), "Meetup".to_string()],
        };
        store.create_run(&newer).await.unwrap();
        store.create_run(&older).await.unwrap();

        let latest = store.latest_run().await.unwrap().unwrap();
        assert_eq!(latest.total, 12);
    }
}
