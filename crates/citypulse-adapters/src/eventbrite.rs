use async_trait::async_trait;
use chrono::{DateTime, Utc};
use citypulse_core::NormalizedEvent;
use citypulse_storage::HttpFetcher;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::base;
use crate::datetime::parse_forward;
use crate::jsonld;
use crate::{build_sydney_event, AdapterError, SourceAdapter, DEFAULT_TIMEZONE};

const URL: &str = "https://www.eventbrite.com/d/australia--sydney/events/";
const SOURCE_NAME: &str = "Eventbrite";

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".search-event-card-wrapper, .eds-event-card-content__content")
        .expect("eventbrite card selector")
});
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".eds-event-card__formatted-name--is-clamped").expect("eventbrite title")
});
static SUBTITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".eds-event-card-content__sub-title").expect("eventbrite subtitle")
});
static ACTION_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.eds-event-card-content__action-link").expect("eventbrite action link")
});
static ANY_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("eventbrite link selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("eventbrite img selector"));
static EVENT_ID_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-event-id]").expect("eventbrite event id selector"));

pub struct Eventbrite;

#[async_trait]
impl SourceAdapter for Eventbrite {
    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn listing_url(&self) -> &'static str {
        URL
    }

    async fn fetch(&self, http: &HttpFetcher) -> Result<Vec<NormalizedEvent>, AdapterError> {
        let html = http.fetch_page(SOURCE_NAME, URL).await?;
        Ok(self.parse_document(&html, Utc::now()))
    }
}

impl Eventbrite {
    /// Parse an already-fetched listing document.
    pub fn parse_document(
        &self,
        html: &str,
        reference: DateTime<Utc>,
    ) -> Vec<NormalizedEvent> {
        let document = Html::parse_document(html);
        let mut events = Vec::new();

        for el in document.select(&CARD_SELECTOR) {
            let card = base::enclosing_card(el);
            let Some(title) = base::first_text(&card, &TITLE_SELECTOR) else {
                continue;
            };

            let mut subtitles = card.select(&SUBTITLE_SELECTOR);
            let date_text = subtitles.next().map(base::inner_text);
            let venue_text = subtitles.next().map(base::inner_text).and_then(base::text_or_none);

            let url = base::first_attr(&card, &ACTION_LINK_SELECTOR, "href")
                .or_else(|| base::first_attr(&card, &ANY_LINK_SELECTOR, "href"));
            let Some(url) = base::absolute_url(URL, url) else {
                continue;
            };

            let Some(start) = date_text
                .as_deref()
                .and_then(|text| parse_forward(text, DEFAULT_TIMEZONE, reference))
            else {
                continue;
            };

            let image_url = base::first_attr(&card, &IMG_SELECTOR, "src")
                .or_else(|| base::first_attr(&card, &IMG_SELECTOR, "data-src"))
                .and_then(|src| base::absolute_url(URL, Some(src)));
            let event_id = base::first_attr(&card, &EVENT_ID_SELECTOR, "data-event-id")
                .or_else(|| base::own_attr(&card, "data-event-id"));

            events.push(build_sydney_event(
                title.clone(),
                title,
                start,
                None,
                venue_text.or_else(|| Some("Sydney".to_string())),
                None,
                image_url,
                SOURCE_NAME,
                url,
                event_id,
            ));
        }

        events.extend(jsonld::listing_candidates(&document, SOURCE_NAME, URL, reference));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // The two wrappers are alternative markup generations; a real page
    // serves one or the other.
    const SAMPLE_HTML: &str = r#"
    <div class="search-event-card-wrapper" data-event-id="9001">
        <a class="eds-event-card-content__action-link" href="/e/harbour-jazz-tickets-9001"></a>
        <div class="eds-event-card__formatted-name--is-clamped">Harbour Jazz Night</div>
        <div class="eds-event-card-content__sub-title">Sat, Aug 15, 7:00 PM</div>
        <div class="eds-event-card-content__sub-title">The Basement</div>
        <img src="https://img.evbuc.com/jazz.jpg">
    </div>
    <div class="eds-event-card-content__content">
        <a href="/e/no-date-tickets-9002"></a>
        <div class="eds-event-card__formatted-name--is-clamped">Missing Date Event</div>
        <div class="eds-event-card-content__sub-title">Check website for dates</div>
    </div>
    "#;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).single().unwrap()
    }

    #[test]
    fn parses_cards_and_drops_undated_ones() {
        let events = Eventbrite.parse_document(SAMPLE_HTML, reference());
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.title, "Harbour Jazz Night");
        assert_eq!(event.description, "Harbour Jazz Night");
        assert_eq!(event.venue_name.as_deref(), Some("The Basement"));
        assert_eq!(
            event.source_url,
            "https://www.eventbrite.com/e/harbour-jazz-tickets-9001"
        );
        assert_eq!(event.dedupe_key, "Eventbrite:9001");
        assert_eq!(event.image_url.as_deref(), Some("https://img.evbuc.com/jazz.jpg"));
        assert_eq!(event.city, "Sydney");
        assert_eq!(event.timezone, "Australia/Sydney");
        // 7 PM Sydney on Aug 15 is 09:00 UTC.
        assert_eq!(
            event.start,
            Utc.with_ymd_and_hms(2026, 8, 15, 9, 0, 0).single().unwrap()
        );
    }

    #[test]
    fn jsonld_events_are_extracted_alongside_cards() {
        let html = format!(
            r#"{SAMPLE_HTML}
            <script type="application/ld+json">
            {{"@type": "Event", "name": "Laneway Festival", "startDate": "2026-09-05T12:00:00+10:00",
              "url": "https://www.eventbrite.com/e/laneway-555", "identifier": "555"}}
            </script>"#
        );
        let events = Eventbrite.parse_document(&html, reference());
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].dedupe_key, "Eventbrite:555");
    }
}
