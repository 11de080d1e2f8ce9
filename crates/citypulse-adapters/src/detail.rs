//! Representative-image extraction from an event's own page.
//!
//! Priority order: Open-Graph metas, Twitter metas, JSON-LD `Event.image`,
//! a preloaded image hint, then the first rendered image. First match wins.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::base::{absolute_url, text_or_none};
use crate::jsonld::{extract_ld_events, ld_image};

static OG_IMAGE_PROP: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("og:image selector"));
static OG_IMAGE_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="og:image"]"#).expect("og:image name selector"));
static OG_IMAGE_SECURE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:image:secure_url"]"#).expect("og secure selector")
});
static TWITTER_IMAGE_NAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="twitter:image"]"#).expect("twitter selector"));
static TWITTER_IMAGE_PROP: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="twitter:image"]"#).expect("twitter prop selector")
});
static PRELOAD_IMAGE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"link[rel="preload"][as="image"]"#).expect("preload selector")
});
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img").expect("img selector"));

/// Find the best representative image on a detail page, resolved to an
/// absolute URL. `None` when the page offers nothing usable.
pub fn extract_detail_image(html: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let meta_selectors = [
        &*OG_IMAGE_PROP,
        &*OG_IMAGE_NAME,
        &*OG_IMAGE_SECURE,
        &*TWITTER_IMAGE_NAME,
        &*TWITTER_IMAGE_PROP,
    ];
    for selector in meta_selectors {
        let content = document
            .select(selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .and_then(|value| text_or_none(value.to_string()));
        if let Some(content) = content {
            return absolute_url(base_url, Some(content));
        }
    }

    for node in extract_ld_events(&document) {
        if let Some(image) = ld_image(&node) {
            return absolute_url(base_url, Some(image));
        }
    }

    if let Some(href) = document
        .select(&PRELOAD_IMAGE)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|value| text_or_none(value.to_string()))
    {
        return absolute_url(base_url, Some(href));
    }

    let first_img = document.select(&IMG).next()?;
    let src = first_img
        .value()
        .attr("src")
        .or_else(|| first_img.value().attr("data-src"))
        .and_then(|value| text_or_none(value.to_string()))?;
    absolute_url(base_url, Some(src))
}
