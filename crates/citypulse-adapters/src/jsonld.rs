//! Structured-data extraction: JSON-LD `Event` nodes embedded in listing
//! and detail pages.
//!
//! This path runs on every listing page in addition to the site-specific
//! selectors; the two result sets are concatenated and de-duplicated
//! downstream by dedupe key.

use chrono::{DateTime, Utc};
use citypulse_core::{CandidateEvent, NormalizedEvent};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::base::{absolute_url, clean_text, text_or_none};
use crate::datetime::parse_forward;
use crate::{DEFAULT_CITY, DEFAULT_COUNTRY, DEFAULT_TIMEZONE};

static LD_SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json selector")
});

/// Collect every `Event` node in the document, including nodes nested
/// under a `@graph` array. Malformed JSON blocks are skipped.
pub fn extract_ld_events(document: &Html) -> Vec<Value> {
    let mut events = Vec::new();
    for script in document.select(&LD_SCRIPT_SELECTOR) {
        let raw: String = script.text().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let Ok(data) = serde_json::from_str::<Value>(raw) else {
            continue;
        };
        let nodes = match data {
            Value::Array(items) => items,
            other => vec![other],
        };
        for node in &nodes {
            collect_event_nodes(node, &mut events);
        }
    }
    events
}

fn collect_event_nodes(node: &Value, out: &mut Vec<Value>) {
    if is_event(node) {
        out.push(node.clone());
    }
    if let Some(graph) = node.get("@graph").and_then(Value::as_array) {
        for item in graph {
            if is_event(item) {
                out.push(item.clone());
            }
        }
    }
}

fn is_event(node: &Value) -> bool {
    match node.get("@type") {
        Some(Value::String(kind)) => kind == "Event",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind.as_str() == Some("Event")),
        _ => false,
    }
}

/// First image URL carried by an `Event` node (`image` may be a string or
/// an array of strings).
pub fn ld_image(node: &Value) -> Option<String> {
    match node.get("image") {
        Some(Value::String(image)) => text_or_none(image.clone()),
        Some(Value::Array(images)) => images
            .first()
            .and_then(Value::as_str)
            .and_then(|image| text_or_none(image.to_string())),
        _ => None,
    }
}

fn str_field<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Value::as_str)
}

/// Normalize one `Event` node into a candidate. Missing title, start time,
/// or URL drops the node silently.
pub fn candidate_from_ld(
    node: &Value,
    source_name: &str,
    fallback_url: &str,
    reference: DateTime<Utc>,
) -> Option<CandidateEvent> {
    let title = text_or_none(clean_text(str_field(node, "name")?))?;
    let description = str_field(node, "description")
        .or_else(|| str_field(node, "summary"))
        .and_then(|text| text_or_none(clean_text(text)))
        .unwrap_or_else(|| title.clone());

    let start = parse_forward(str_field(node, "startDate")?, DEFAULT_TIMEZONE, reference)?;
    let end = str_field(node, "endDate")
        .and_then(|text| parse_forward(text, DEFAULT_TIMEZONE, reference));

    let url = str_field(node, "url").unwrap_or(fallback_url);
    let source_url = absolute_url(fallback_url, Some(url.to_string()))?;

    let location = node.get("location");
    let venue_name = location
        .and_then(|loc| {
            str_field(loc, "name").or_else(|| {
                loc.get("address")
                    .and_then(|address| str_field(address, "name"))
            })
        })
        .and_then(|text| text_or_none(clean_text(text)));
    let address = location
        .and_then(|loc| loc.get("address"))
        .and_then(|address| {
            str_field(address, "streetAddress")
                .or_else(|| str_field(address, "addressLocality"))
                .or_else(|| str_field(address, "addressRegion"))
        })
        .and_then(|text| text_or_none(clean_text(text)));

    let image_url = ld_image(node).and_then(|image| absolute_url(fallback_url, Some(image)));
    let event_id = str_field(node, "identifier")
        .or_else(|| str_field(node, "@id"))
        .map(ToString::to_string);

    Some(CandidateEvent {
        title,
        description,
        start,
        end,
        timezone: DEFAULT_TIMEZONE.name().to_string(),
        venue_name,
        address,
        city: DEFAULT_CITY.to_string(),
        country: DEFAULT_COUNTRY.to_string(),
        category: None,
        tags: Vec::new(),
        image_url,
        source_name: source_name.to_string(),
        source_url,
        source_event_id: event_id,
    })
}

/// The structured-data half of an adapter's listing parse.
pub fn listing_candidates(
    document: &Html,
    source_name: &str,
    base_url: &str,
    reference: DateTime<Utc>,
) -> Vec<NormalizedEvent> {
    extract_ld_events(document)
        .iter()
        .filter_map(|node| candidate_from_ld(node, source_name, base_url, reference))
        .map(NormalizedEvent::from_candidate)
        .collect()
}
