//! Cross-adapter extraction behavior: the card path and the JSON-LD path
//! both run, and their overlap collapses later under one dedupe key.

use chrono::{TimeZone, Utc};
use citypulse_adapters::{active_adapters, source_names, Eventbrite};

const DUAL_PATH_PAGE: &str = r#"
<html><head>
<script type="application/ld+json">
{
    "@type": "Event",
    "name": "Harbour Jazz Night",
    "startDate": "2026-08-15T19:00:00+10:00",
    "url": "https://www.eventbrite.com/e/harbour-jazz-tickets-9001",
    "identifier": "9001"
}
</script>
</head><body>
<div class="search-event-card-wrapper" data-event-id="9001">
    <a class="eds-event-card-content__action-link" href="/e/harbour-jazz-tickets-9001"></a>
    <div class="eds-event-card__formatted-name--is-clamped">Harbour Jazz Night</div>
    <div class="eds-event-card-content__sub-title">Sat, Aug 15, 7:00 PM</div>
    <div class="eds-event-card-content__sub-title">The Basement</div>
</div>
</body></html>
"#;

#[test]
fn both_extraction_paths_run_and_agree_on_identity() {
    let reference = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).single().unwrap();
    let events = Eventbrite.parse_document(DUAL_PATH_PAGE, reference);

    // The same listing surfaces once per path; the reconciler collapses
    // them because the dedupe key matches.
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].dedupe_key, "Eventbrite:9001");
    assert_eq!(events[1].dedupe_key, "Eventbrite:9001");
    assert_eq!(events[0].start, events[1].start);
}

#[test]
fn registry_covers_every_sydney_source_once() {
    let names = source_names();
    assert_eq!(
        names,
        vec!["Eventbrite", "Meetup", "Time Out Sydney", "What's On Sydney"]
    );

    for adapter in active_adapters() {
        assert!(adapter.listing_url().starts_with("https://"));
    }
}
