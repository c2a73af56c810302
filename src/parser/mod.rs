pub mod extract;

use std::collections::HashSet;
use std::fmt;

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ScrapeError;
use crate::fetch::Storefront;
use crate::money::Money;
use extract::Partial;

const NO_TITLE: &str = "No Title Found";
const NO_DESCRIPTION: &str = "No Description Found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedVariant {
    pub label: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    JsonLd,
    Theme,
    ProductJs,
    Html,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Source::JsonLd => "json-ld",
            Source::Theme => "theme",
            Source::ProductJs => ".js",
            Source::Html => "html",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ScrapedProduct {
    pub source_url: String,
    pub domain: String,
    pub handle: String,
    pub title: String,
    pub description: String,
    pub images: Vec<String>,
    pub variants: Vec<ScrapedVariant>,
    pub collection: Option<String>,
    /// Sources that contributed at least one field, in fallback order.
    pub sources: Vec<Source>,
}

/// A storefront product URL split into the parts the scraper needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductUrl {
    url: Url,
    pub domain: String,
    pub handle: String,
}

impl ProductUrl {
    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        let invalid = || ScrapeError::InvalidUrl(raw.to_string());
        let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
        let domain = url.host_str().ok_or_else(invalid)?.to_string();

        let mut segments = url.path_segments().ok_or_else(invalid)?;
        segments.find(|s| *s == "products").ok_or_else(invalid)?;
        let handle = segments
            .next()
            .map(|h| h.trim_end_matches(".js").trim_end_matches(".json"))
            .filter(|h| !h.is_empty())
            .ok_or_else(invalid)?
            .to_string();

        Ok(Self { url, domain, handle })
    }

    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// `{origin}/products/{handle}`: one key per product however the page
    /// was reached (collection-scoped path, query, fragment).
    pub fn canonical(&self) -> String {
        format!("{}/products/{}", self.origin(), self.handle)
    }

    /// The storefront's JSON view of the product, prices in cents.
    pub fn js_url(&self) -> String {
        format!("{}.js", self.canonical())
    }

    fn resolve(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }
        if let Some(rest) = link.strip_prefix("//") {
            return Some(format!("https://{}", rest));
        }
        self.url.join(link).ok().map(String::from)
    }
}

/// Everything extracted from the product page HTML itself.
#[derive(Debug, Default)]
pub struct PageSources {
    pub jsonld: Option<Partial>,
    pub theme: Option<Partial>,
    pub html: Partial,
    pub collection: Option<String>,
}

impl PageSources {
    pub fn from_html(html: &str) -> Self {
        let doc = Html::parse_document(html);
        Self {
            jsonld: extract::jsonld::extract(&doc),
            theme: extract::theme::extract(&doc),
            html: extract::html::extract(&doc),
            collection: extract::html::collection_name(&doc),
        }
    }
}

/// Fetch a product page and its `.js` endpoint and merge what they say.
/// Only a failure to load the page itself is fatal.
pub async fn scrape_product(client: &Storefront, raw_url: &str) -> Result<ScrapedProduct, ScrapeError> {
    let url = ProductUrl::parse(raw_url)?;
    info!("Scraping product: {}", raw_url);

    let body = client.get_text(raw_url).await?;
    let page = PageSources::from_html(&body);

    let js_url = url.js_url();
    let js = match client.get_json::<extract::variants::ProductJs>(&js_url).await {
        Ok(js) => Some(Partial::from(js)),
        Err(e) => {
            warn!("Failed to get variant info from {}: {}", js_url, e);
            None
        }
    };

    let product = merge(&url, raw_url, page, js);
    debug!(
        "{}: {} variants, {} images via [{}]",
        product.handle,
        product.variants.len(),
        product.images.len(),
        product
            .sources
            .iter()
            .map(Source::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(product)
}

/// Reconcile the sources. Text fields and images prefer JSON-LD, then theme
/// JSON, then `.js`, then raw HTML. Variants prefer `.js`, whose prices are
/// exact cents, then theme JSON, then JSON-LD offers.
pub fn merge(url: &ProductUrl, source_url: &str, page: PageSources, js: Option<Partial>) -> ScrapedProduct {
    let text_order: Vec<(Source, &Partial)> = [
        (Source::JsonLd, page.jsonld.as_ref()),
        (Source::Theme, page.theme.as_ref()),
        (Source::ProductJs, js.as_ref()),
        (Source::Html, Some(&page.html)),
    ]
    .into_iter()
    .filter_map(|(s, p)| p.map(|p| (s, p)))
    .collect();

    let mut used: Vec<Source> = Vec::new();
    let mut note = |s: Source| {
        if !used.contains(&s) {
            used.push(s);
        }
    };

    let title = text_order
        .iter()
        .find_map(|(s, p)| p.title.clone().map(|t| (*s, t)))
        .map(|(s, t)| {
            note(s);
            t
        })
        .unwrap_or_else(|| NO_TITLE.to_string());

    let description = text_order
        .iter()
        .find_map(|(s, p)| p.description.clone().map(|d| (*s, d)))
        .map(|(s, d)| {
            note(s);
            d
        })
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());

    let images = text_order
        .iter()
        .find(|(_, p)| !p.images.is_empty())
        .map(|(s, p)| {
            note(*s);
            normalize_images(url, &p.images)
        })
        .unwrap_or_default();

    let variant_order = [
        (Source::ProductJs, js.as_ref()),
        (Source::Theme, page.theme.as_ref()),
        (Source::JsonLd, page.jsonld.as_ref()),
    ];
    let variants = variant_order
        .into_iter()
        .find_map(|(s, p)| p.filter(|p| !p.variants.is_empty()).map(|p| (s, p)))
        .map(|(s, p)| {
            note(s);
            p.variants.clone()
        })
        .unwrap_or_default();

    used.sort_by_key(|s| *s as u8);

    ScrapedProduct {
        source_url: source_url.to_string(),
        domain: url.domain.clone(),
        handle: url.handle.clone(),
        title,
        description,
        images,
        variants,
        collection: page.collection,
        sources: used,
    }
}

fn normalize_images(url: &ProductUrl, images: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    images
        .iter()
        .filter_map(|i| url.resolve(i))
        .filter(|i| seen.insert(i.clone()))
        .collect()
}
