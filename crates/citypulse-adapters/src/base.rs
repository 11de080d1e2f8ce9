//! Shared HTML extraction helpers used by every adapter.

use scraper::{ElementRef, Selector};
use url::Url;

pub fn clean_text(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

pub fn text_or_none(value: String) -> Option<String> {
    let cleaned = clean_text(&value);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|node| text_or_none(inner_text(node)))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .and_then(|value| text_or_none(value.to_string()))
}

pub fn own_attr(element: &ElementRef<'_>, attr: &str) -> Option<String> {
    element
        .value()
        .attr(attr)
        .and_then(|value| text_or_none(value.to_string()))
}

/// Resolve a possibly-relative href against the listing page URL.
pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|url| url.to_string())
}

/// Climb to the enclosing card container, the way a `closest("section,
/// div")` call would: the element itself counts when it already is one.
pub fn enclosing_card(el: ElementRef<'_>) -> ElementRef<'_> {
    if matches!(el.value().name(), "section" | "div") {
        return el;
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|node| matches!(node.value().name(), "section" | "div"))
        .unwrap_or(el)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Harbour \n  Jazz\tNight  "), "Harbour Jazz Night");
        assert_eq!(text_or_none("   \n ".to_string()), None);
    }

    #[test]
    fn absolute_url_resolves_relative_hrefs() {
        assert_eq!(
            absolute_url(
                "https://www.eventbrite.com/d/australia--sydney/events/",
                Some("/e/jazz-123".to_string())
            )
            .as_deref(),
            Some("https://www.eventbrite.com/e/jazz-123")
        );
        assert_eq!(
            absolute_url("https://example.com/", Some("https://other.com/a".to_string())).as_deref(),
            Some("https://other.com/a")
        );
        assert_eq!(absolute_url("https://example.com/", None), None);
    }

    #[test]
    fn enclosing_card_climbs_to_container() {
        let html = Html::parse_document(
            r#"<div class="card"><article><span class="inner">x</span></article></div>"#,
        );
        let selector = Selector::parse(".inner").unwrap();
        let inner = html.select(&selector).next().unwrap();
        let card = enclosing_card(inner);
        assert_eq!(card.value().name(), "div");
    }
}
