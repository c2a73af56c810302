use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::Partial;

static OG_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static OG_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property="og:description"]"#).unwrap());
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).unwrap());
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:image:secure_url"], meta[property="og:image"]"#).unwrap()
});
static H1: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const IGNORED_COLLECTION_LABELS: &[&str] = &["all", "all products"];

/// Last-resort product fields from Open Graph tags and visible markup.
pub fn extract(doc: &Html) -> Partial {
    let title = meta_content(doc, &OG_TITLE)
        .or_else(|| first_text(doc, &H1))
        .or_else(|| first_text(doc, &TITLE));
    let description =
        meta_content(doc, &OG_DESCRIPTION).or_else(|| meta_content(doc, &META_DESCRIPTION));

    let mut images: Vec<String> = Vec::new();
    for element in doc.select(&OG_IMAGE) {
        if let Some(url) = element.value().attr("content").map(str::trim) {
            if !url.is_empty() && !images.iter().any(|i| i == url) {
                images.push(url.to_string());
            }
        }
    }

    Partial {
        title,
        description,
        images,
        variants: Vec::new(),
    }
}

/// Text of the first collection link that is not a product link, such as a
/// breadcrumb. Generic "All" listings do not count.
pub fn collection_name(doc: &Html) -> Option<String> {
    let link = doc.select(&ANCHOR).find(|a| {
        a.value()
            .attr("href")
            .map(|h| h.contains("/collections/") && !h.contains("/products/"))
            .unwrap_or(false)
    })?;
    let text = element_text(&link);
    if text.is_empty() || IGNORED_COLLECTION_LABELS.contains(&text.to_lowercase().as_str()) {
        return None;
    }
    Some(text)
}

fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .filter_map(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .map(|e| element_text(&e))
        .find(|t| !t.is_empty())
}

fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
