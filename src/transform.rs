use std::collections::HashSet;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::Metafield;
use crate::error::ScrapeError;
use crate::money::Money;
use crate::parser::ScrapedProduct;

pub const OPTION_NAME: &str = "Size";
const HANDLE_SUFFIX_LEN: usize = 6;

/// Operator choices applied to every product of a run.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub product_type: String,
    pub tags: Vec<String>,
    pub markup_percent: u32,
    pub handle_suffix: bool,
    pub metafields: Vec<Metafield>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftVariant {
    pub size: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMedia {
    pub original_source: String,
    pub alt: String,
    pub media_content_type: &'static str,
}

/// A product in the shape the upload sequence needs.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub source_url: String,
    pub handle: String,
    pub title: String,
    pub body_html: String,
    pub vendor: String,
    pub product_type: String,
    pub tags: Vec<String>,
    pub sizes: Vec<String>,
    pub variants: Vec<DraftVariant>,
    pub media: Vec<DraftMedia>,
    pub metafields: Vec<Metafield>,
}

/// `www.mariab.pk` → `Mariab`.
pub fn vendor_from_domain(domain: &str) -> String {
    let host = domain.trim().trim_start_matches("www.");
    let label = host.split('.').next().unwrap_or(host);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn compose_title(vendor: &str, collection: Option<&str>, title: &str) -> String {
    match collection.map(str::trim).filter(|c| !c.is_empty()) {
        Some(collection) => format!("{} | {} | {}", vendor, collection, title),
        None => format!("{} | {}", vendor, title),
    }
}

pub fn random_suffix<R: Rng>(rng: &mut R) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(HANDLE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

pub fn build_draft<R: Rng>(
    scraped: &ScrapedProduct,
    opts: &UploadOptions,
    rng: &mut R,
) -> Result<ProductDraft, ScrapeError> {
    if scraped.variants.is_empty() {
        return Err(ScrapeError::NoVariants(scraped.source_url.clone()));
    }

    let vendor = vendor_from_domain(&scraped.domain);
    let title = compose_title(&vendor, scraped.collection.as_deref(), &scraped.title);

    let handle = if opts.handle_suffix {
        format!("{}-{}", scraped.handle, random_suffix(rng))
    } else {
        scraped.handle.clone()
    };

    // productSet rejects two variants with the same option value
    let mut seen = HashSet::new();
    let mut sizes = Vec::new();
    let mut variants = Vec::new();
    for v in &scraped.variants {
        if !seen.insert(v.label.clone()) {
            warn!("{}: dropping duplicate variant {:?}", scraped.handle, v.label);
            continue;
        }
        sizes.push(v.label.clone());
        variants.push(DraftVariant {
            size: v.label.clone(),
            price: v.price.with_markup(opts.markup_percent),
            compare_at_price: v
                .compare_at_price
                .map(|m| m.with_markup(opts.markup_percent)),
            sku: v.sku.clone(),
        });
    }

    let media = scraped
        .images
        .iter()
        .enumerate()
        .map(|(idx, src)| DraftMedia {
            original_source: src.clone(),
            alt: format!("{} Image {}", scraped.title, idx + 1),
            media_content_type: "IMAGE",
        })
        .collect();

    Ok(ProductDraft {
        source_url: scraped.source_url.clone(),
        handle,
        title,
        body_html: scraped.description.clone(),
        vendor,
        product_type: opts.product_type.clone(),
        tags: opts.tags.clone(),
        sizes,
        variants,
        media,
        metafields: opts.metafields.clone(),
    })
}

impl ProductDraft {
    /// `ProductSetInput` for the create step. Tags are applied by their own
    /// step so a tagging failure does not block creation.
    pub fn to_product_set_input(&self) -> Value {
        let variants: Vec<Value> = self
            .variants
            .iter()
            .map(|v| {
                let mut entry = json!({
                    "price": v.price,
                    "optionValues": [{ "optionName": OPTION_NAME, "name": v.size }],
                });
                if let Some(compare_at) = v.compare_at_price {
                    entry["compareAtPrice"] = json!(compare_at);
                }
                if let Some(sku) = &v.sku {
                    entry["sku"] = json!(sku);
                }
                entry
            })
            .collect();

        let mut input = json!({
            "title": self.title,
            "handle": self.handle,
            "descriptionHtml": self.body_html,
            "vendor": self.vendor,
            "productType": self.product_type,
            "productOptions": [{
                "name": OPTION_NAME,
                "position": 1,
                "values": self.sizes.iter().map(|s| json!({ "name": s })).collect::<Vec<_>>(),
            }],
            "variants": variants,
        });
        if !self.metafields.is_empty() {
            input["metafields"] = json!(self.metafields);
        }
        input
    }
}
