//! The ingestion state machine: diff one candidate against the store and
//! apply exactly one of insert or patch; sweep stale records per source.

use chrono::{DateTime, Duration, Utc};
use citypulse_core::{EventStatus, NormalizedEvent, StatusTagSet, StoredEvent};
use citypulse_storage::{EventStore, StoreError};
use uuid::Uuid;

/// Records not re-seen within this window of a run start are swept inactive.
pub fn default_grace() -> Duration {
    Duration::hours(6)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Apply one candidate. Applying the same unchanged candidate twice in a
/// row moves only the seen timestamps the second time; status and tags are
/// stable.
pub async fn reconcile(
    store: &dyn EventStore,
    event: &NormalizedEvent,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, StoreError> {
    let Some(existing) = store.find_by_dedupe_key(&event.dedupe_key).await? else {
        store
            .insert(StoredEvent {
                id: Uuid::new_v4(),
                event: event.clone(),
                status: EventStatus::New,
                status_tags: StatusTagSet::from(EventStatus::New),
                last_scraped_at: now,
                last_seen_at: now,
                imported_at: None,
                imported_by: None,
                import_notes: None,
                created_at: now,
                updated_at: now,
            })
            .await?;
        return Ok(ReconcileOutcome::Inserted);
    };

    let has_changed = existing.event.content_hash != event.content_hash;
    // Any sighting reactivates: the inactive tag clears regardless of hash.
    let base_tags = existing.status_tags.without(EventStatus::Inactive);

    let mut next_status = existing.status;
    if existing.status == EventStatus::Inactive {
        next_status = EventStatus::Updated;
    }
    if has_changed {
        // Deliberately overwrites an `imported` status too; the imported
        // tag and metadata survive below.
        next_status = EventStatus::Updated;
    }
    let next_tags = if has_changed {
        base_tags.with(EventStatus::Updated)
    } else {
        base_tags
    };

    let reactivated = existing.status == EventStatus::Inactive;
    store
        .update(&StoredEvent {
            id: existing.id,
            event: event.clone(),
            status: next_status,
            status_tags: next_tags,
            last_scraped_at: now,
            last_seen_at: now,
            imported_at: existing.imported_at,
            imported_by: existing.imported_by,
            import_notes: existing.import_notes,
            created_at: existing.created_at,
            updated_at: now,
        })
        .await?;

    Ok(if has_changed || reactivated {
        ReconcileOutcome::Updated
    } else {
        ReconcileOutcome::Unchanged
    })
}

/// Mark every record of `source_name` inactive when it was last seen before
/// `run_started_at - grace` and is not already tagged inactive. Idempotent:
/// the guard prevents duplicate tagging on re-runs. Returns the number of
/// records swept.
pub async fn sweep_source(
    store: &dyn EventStore,
    source_name: &str,
    run_started_at: DateTime<Utc>,
    grace: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let cutoff = run_started_at - grace.unwrap_or_else(default_grace);
    let mut swept = 0;

    for record in store.list_by_source(source_name).await? {
        if record.last_seen_at < cutoff && !record.status_tags.contains(EventStatus::Inactive) {
            let tags = record.status_tags.with(EventStatus::Inactive);
            store
                .update(&StoredEvent {
                    status: EventStatus::Inactive,
                    status_tags: tags,
                    updated_at: now,
                    ..record
                })
                .await?;
            swept += 1;
        }
    }

    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use citypulse_core::CandidateEvent;
    use citypulse_storage::MemoryStore;

    fn candidate_for(source: &str, id: &str, description: &str) -> NormalizedEvent {
        NormalizedEvent::from_candidate(CandidateEvent {
            title: "Harbour Jazz Night".to_string(),
            description: description.to_string(),
            start: Utc.with_ymd_and_hms(2026, 9, 12, 9, 0, 0).single().unwrap(),
            end: None,
            timezone: "Australia/Sydney".to_string(),
            venue_name: Some("The Basement".to_string()),
            address: None,
            city: "Sydney".to_string(),
            country: "Australia".to_string(),
            category: None,
            tags: vec![],
            image_url: None,
            source_name: source.to_string(),
            source_url: format!("https://example.com/e/{id}"),
            source_event_id: Some(id.to_string()),
        })
    }

    fn candidate(description: &str) -> NormalizedEvent {
        candidate_for("Eventbrite", "123", description)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, hour, 0, 0).single().unwrap()
    }

    async fn stored(store: &MemoryStore, key: &str) -> StoredEvent {
        store.find_by_dedupe_key(key).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn first_sighting_inserts_as_new() {
        let store = MemoryStore::new();
        let outcome = reconcile(&store, &candidate("desc"), at(6)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Inserted);

        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::New);
        assert_eq!(record.status_tags.as_strings(), vec!["new"]);
        assert_eq!(record.created_at, at(6));
        assert_eq!(record.last_seen_at, at(6));
    }

    #[tokio::test]
    async fn unchanged_resighting_only_advances_seen_timestamps() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("desc"), at(6)).await.unwrap();
        let outcome = reconcile(&store, &candidate("desc"), at(7)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);

        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::New);
        assert_eq!(record.status_tags.as_strings(), vec!["new"]);
        assert_eq!(record.created_at, at(6));
        assert_eq!(record.last_seen_at, at(7));
        assert_eq!(record.last_scraped_at, at(7));
        assert_eq!(record.updated_at, at(7));
    }

    #[tokio::test]
    async fn changed_content_moves_to_updated() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("original"), at(6)).await.unwrap();
        let outcome = reconcile(&store, &candidate("revised"), at(7)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);

        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::Updated);
        assert_eq!(record.status_tags.as_strings(), vec!["new", "updated"]);
        assert_eq!(record.event.description, "revised");
    }

    #[tokio::test]
    async fn reappearing_inactive_record_reactivates_even_unchanged() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("desc"), at(0)).await.unwrap();

        // Swept inactive after not being seen.
        sweep_source(&store, "Eventbrite", at(12), None, at(12)).await.unwrap();
        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::Inactive);
        assert_eq!(record.status_tags.as_strings(), vec!["new", "inactive"]);

        // Same content reappears: inactive tag clears, status forced updated.
        let outcome = reconcile(&store, &candidate("desc"), at(13)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::Updated);
        assert_eq!(record.status_tags.as_strings(), vec!["new"]);
    }

    #[tokio::test]
    async fn changed_candidate_reverts_imported_status_but_keeps_tag() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("original"), at(0)).await.unwrap();

        // External import flow marks the record imported.
        let record = stored(&store, "Eventbrite:123").await;
        let imported = StoredEvent {
            status: EventStatus::Imported,
            status_tags: record.status_tags.with(EventStatus::Imported),
            imported_at: Some(at(1)),
            imported_by: Some("curator".to_string()),
            updated_at: at(1),
            ..record
        };
        store.update(&imported).await.unwrap();

        // A later scrape with changed content silently reverts the status;
        // the imported tag and metadata survive. Observed behavior, pinned.
        reconcile(&store, &candidate("revised"), at(2)).await.unwrap();
        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::Updated);
        assert!(record.status_tags.contains(EventStatus::Imported));
        assert_eq!(record.imported_by.as_deref(), Some("curator"));
        assert_eq!(record.imported_at, Some(at(1)));
    }

    #[tokio::test]
    async fn unchanged_sighting_leaves_imported_status_alone() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("desc"), at(0)).await.unwrap();

        let record = stored(&store, "Eventbrite:123").await;
        let imported = StoredEvent {
            status: EventStatus::Imported,
            status_tags: record.status_tags.with(EventStatus::Imported),
            imported_at: Some(at(1)),
            updated_at: at(1),
            ..record
        };
        store.update(&imported).await.unwrap();

        reconcile(&store, &candidate("desc"), at(2)).await.unwrap();
        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::Imported);
    }

    #[tokio::test]
    async fn sweep_respects_grace_window_and_is_idempotent() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("desc"), at(0)).await.unwrap();

        // Last seen 5h before the run start: inside the 6h default grace.
        let swept = sweep_source(&store, "Eventbrite", at(5), None, at(5)).await.unwrap();
        assert_eq!(swept, 0);

        // 7h stale: swept.
        let swept = sweep_source(&store, "Eventbrite", at(7), None, at(7)).await.unwrap();
        assert_eq!(swept, 1);
        let record = stored(&store, "Eventbrite:123").await;
        assert_eq!(record.status, EventStatus::Inactive);
        assert_eq!(record.status_tags.as_strings(), vec!["new", "inactive"]);

        // Re-running without new data changes nothing further.
        let swept = sweep_source(&store, "Eventbrite", at(8), None, at(8)).await.unwrap();
        assert_eq!(swept, 0);
        let again = stored(&store, "Eventbrite:123").await;
        assert_eq!(again.status_tags.as_strings(), vec!["new", "inactive"]);
        assert_eq!(again.updated_at, at(7));
    }

    #[tokio::test]
    async fn sweep_only_touches_the_named_source() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("desc"), at(0)).await.unwrap();

        let other = candidate_for("Meetup", "999", "desc");
        reconcile(&store, &other, at(0)).await.unwrap();

        sweep_source(&store, "Meetup", at(12), None, at(12)).await.unwrap();
        let eventbrite = stored(&store, "Eventbrite:123").await;
        assert_eq!(eventbrite.status, EventStatus::New);
        let meetup = stored(&store, "Meetup:999").await;
        assert_eq!(meetup.status, EventStatus::Inactive);
    }

    #[tokio::test]
    async fn custom_grace_window_overrides_default() {
        let store = MemoryStore::new();
        reconcile(&store, &candidate("desc"), at(0)).await.unwrap();

        let swept = sweep_source(
            &store,
            "Eventbrite",
            at(2),
            Some(Duration::hours(1)),
            at(2),
        )
        .await
        .unwrap();
        assert_eq!(swept, 1);
    }
}
