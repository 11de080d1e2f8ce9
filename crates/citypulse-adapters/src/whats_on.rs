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

const URL: &str = "https://whatson.cityofsydney.nsw.gov.au/events";
const SOURCE_NAME: &str = "What's On Sydney";

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.card, article.card, .event-card").expect("whats-on card selector")
});
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3, h2").expect("whats-on heading selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("whats-on link selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time").expect("whats-on time selector"));
static LOCATION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".location, .event-location").expect("whats-on location selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("whats-on img selector"));

const FALLBACK_IMAGE_PREFIX: &str = "/images/fallbacks/";

pub struct WhatsOnSydney;

#[async_trait]
impl SourceAdapter for WhatsOnSydney {
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

impl WhatsOnSydney {
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
            let url = base::own_attr(&card, "href")
                .or_else(|| base::first_attr(&card, &LINK_SELECTOR, "href"));
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
                None,
            ));
        }

        events.extend(jsonld::listing_candidates(&document, SOURCE_NAME, URL, reference));
        events
    }
}
