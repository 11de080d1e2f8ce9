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

const URL: &str = "https://www.timeout.com/sydney/things-to-do";
const SOURCE_NAME: &str = "Time Out Sydney";

static CARD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.card, article.card, a._card").expect("timeout card selector"));
static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3, h2").expect("timeout heading selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time").expect("timeout time selector"));
static IMG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("timeout img selector"));

const FALLBACK_IMAGE_PREFIX: &str = "/images/fallbacks/";

pub struct TimeOutSydney;

#[async_trait]
impl SourceAdapter for TimeOutSydney {
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

impl TimeOutSydney {
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
            let Some(url) = base::absolute_url(URL, base::own_attr(&card, "href")) else {
                continue;
            };
            let Some(start) = base::first_text(&card, &TIME_SELECTOR)
                .and_then(|text| parse_forward(&text, DEFAULT_TIMEZONE, reference))
            else {
                continue;
            };

            let image_url = base::first_attr(&card, &IMG_SELECTOR, "src")
                .or_else(|| base::first_attr(&card, &IMG_SELECTOR, "data-src"))
                .filter(|src| !src.starts_with(FALLBACK_IMAGE_PREFIX))
                .and_then(|src| base::absolute_url(URL, Some(src)));

            events.push(build_sydney_event(
                title.clone(),
                title,
                start,
                None,
                Some("Sydney".to_string()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_HTML: &str = r#"
    <a class="card" href="/sydney/things-to-do/vivid-sydney-2026">
        <h3>Vivid Sydney</h3>
        <time>22 May 2026</time>
        <img data-src="https://media.timeout.com/images/vivid.jpg">
    </a>
    <a class="_card" href="/sydney/things-to-do/harbour-swim">
        <h2>Harbour Swim Series</h2>
        <time>Sunday 7:00am</time>
    </a>
    <a class="card" href="/sydney/things-to-do/editorial-feature">
        <h3>The 50 best pubs in Sydney</h3>
    </a>
    "#;

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).single().unwrap()
    }

    #[test]
    fn parses_dated_cards_and_drops_editorial_features() {
        let events = TimeOutSydney.parse_document(SAMPLE_HTML, reference());
        assert_eq!(events.len(), 2);

        let vivid = &events[0];
        assert_eq!(vivid.title, "Vivid Sydney");
        assert_eq!(
            vivid.source_url,
            "https://www.timeout.com/sydney/things-to-do/vivid-sydney-2026"
        );
        assert_eq!(
            vivid.dedupe_key,
            "Time Out Sydney:https://www.timeout.com/sydney/things-to-do/vivid-sydney-2026"
        );
        assert_eq!(
            vivid.image_url.as_deref(),
            Some("https://media.timeout.com/images/vivid.jpg")
        );
        // 22 May, noon Sydney (no clock time on the card).
        assert_eq!(
            vivid.start,
            Utc.with_ymd_and_hms(2026, 5, 22, 2, 0, 0).single().unwrap()
        );

        // Next Sunday after the Tuesday reference is Mar 15.
        let swim = &events[1];
        assert_eq!(
            swim.start,
            Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).single().unwrap()
        );
    }
}
