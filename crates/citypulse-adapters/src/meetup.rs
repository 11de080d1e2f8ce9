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

const URL: &str = "https://www.meetup.com/find/?location=au--sydney&source=EVENTS";
const SOURCE_NAME: &str = "Meetup";

/// Meetup serves hydrated React markup; group pages render events as list
/// items, search results as articles.
static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li, article").expect("meetup card selector"));
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3").expect("meetup heading selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("meetup link selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time").expect("meetup time selector"));
static LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-event-location]").expect("meetup location selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("meetup img selector"));

const FALLBACK_IMAGE_PREFIX: &str = "/images/fallbacks/";

pub struct Meetup;

#[async_trait]
impl SourceAdapter for Meetup {
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

impl Meetup {
    /// Parse an already-fetched listing document.
    pub fn parse_document(
        &self,
        html: &str,
        reference: DateTime<Utc>,
    ) -> Vec<NormalizedEvent> {
        let document = Html::parse_document(html);
        let mut events = Vec::new();

        for card in document.select(&CARD_SELECTOR) {
            let Some(title) = base::first_text(&card, &HEADING_SELECTOR) else {
                continue;
            };
            let url = base::first_attr(&card, &LINK_SELECTOR, "href")
                .or_else(|| base::first_attr(&card, &LINK_SELECTOR, "data-event-url"));
            let Some(url) = base::absolute_url(URL, url) else {
                continue;
            };

            let Some(start) = base::first_text(&card, &TIME_SELECTOR)
                .and_then(|text| parse_forward(&text, DEFAULT_TIMEZONE, reference))
            else {
                continue;
            };

            let venue_text = base::first_text(&card, &LOCATION_SELECTOR);
            let image_url = base::first_attr(&card, &IMG_SELECTOR, "src")
                .or_else(|| base::first_attr(&card, &IMG_SELECTOR, "data-src"))
                .filter(|src| !src.starts_with(FALLBACK_IMAGE_PREFIX))
                .and_then(|src| base::absolute_url(URL, Some(src)));
            let event_id = base::own_attr(&card, "data-eventid");

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
