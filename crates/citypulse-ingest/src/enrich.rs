//! Detail-page image enrichment over a bounded worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use citypulse_adapters::detail::extract_detail_image;
use citypulse_core::NormalizedEvent;
use citypulse_storage::PageFetcher;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Visit each candidate's own page and fill in a representative image where
/// one is discoverable, recomputing the content hash on change.
///
/// A fixed pool of workers claims items through a shared atomic cursor; two
/// workers can never claim the same index. Per-item fetch or parse failures
/// count as "no image found" and never abort the pool. Results accumulate
/// in completion order — downstream keys on identity, not position.
pub async fn enrich_images(
    fetcher: Arc<dyn PageFetcher>,
    events: Vec<NormalizedEvent>,
    concurrency: usize,
) -> Vec<NormalizedEvent> {
    if events.is_empty() {
        return events;
    }

    let events = Arc::new(events);
    let cursor = Arc::new(AtomicUsize::new(0));
    let results: Arc<Mutex<Vec<NormalizedEvent>>> =
        Arc::new(Mutex::new(Vec::with_capacity(events.len())));

    let workers = concurrency.max(1).min(events.len());
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let events = Arc::clone(&events);
        let cursor = Arc::clone(&cursor);
        let results = Arc::clone(&results);
        let fetcher = Arc::clone(&fetcher);
        handles.push(tokio::spawn(async move {
            loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                if index >= events.len() {
                    break;
                }
                let current = events[index].clone();
                let enriched = match fetch_detail_image(fetcher.as_ref(), &current).await {
                    Some(image_url) => current.with_image(image_url),
                    None => current,
                };
                results.lock().await.push(enriched);
            }
        }));
    }

    for handle in handles {
        // A panicking worker loses only the items it had claimed; the pool
        // itself finishes.
        let _ = handle.await;
    }

    Arc::try_unwrap(results)
        .expect("all enrichment workers joined")
        .into_inner()
}

async fn fetch_detail_image(fetcher: &dyn PageFetcher, event: &NormalizedEvent) -> Option<String> {
    match fetcher.fetch_page(&event.source_name, &event.source_url).await {
        Ok(html) => extract_detail_image(&html, &event.source_url),
        Err(err) => {
            debug!(source_url = %event.source_url, error = %err, "detail fetch failed");
            None
        }
    }
}
