use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::Partial;
use crate::money::Money;
use crate::parser::ScrapedVariant;

const DEFAULT_LABEL: &str = "Default Title";

static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// First `Product` or `ProductGroup` node across all JSON-LD scripts.
pub fn extract(doc: &Html) -> Option<Partial> {
    doc.select(&LD_JSON)
        .filter_map(|script| {
            let text = script.text().collect::<String>();
            serde_json::from_str::<Value>(text.trim()).ok()
        })
        .find_map(|value| find_product(&value).map(product_to_partial))
}

fn find_product(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_product),
        Value::Object(obj) => {
            if is_product(value) {
                return Some(value);
            }
            obj.get("@graph").and_then(find_product)
        }
        _ => None,
    }
}

fn is_product(value: &Value) -> bool {
    let matches = |t: &str| matches!(t, "Product" | "ProductGroup");
    match value.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

fn product_to_partial(product: &Value) -> Partial {
    let title = str_field(product, "name");
    let description = str_field(product, "description");

    let mut images = Vec::new();
    if let Some(image) = product.get("image") {
        collect_images(image, &mut images);
    }

    let mut offers = Vec::new();
    match product.get("hasVariant").and_then(Value::as_array) {
        Some(members) => {
            for member in members {
                let label = str_field(member, "name")
                    .map(|n| strip_group_prefix(&n, title.as_deref()))
                    .unwrap_or_default();
                if let Some(offer) = member.get("offers") {
                    collect_offers(offer, &label, str_field(member, "sku"), &mut offers);
                }
                if images.is_empty() {
                    if let Some(image) = member.get("image") {
                        collect_images(image, &mut images);
                    }
                }
            }
        }
        None => {
            if let Some(value) = product.get("offers") {
                collect_offers(value, "", str_field(product, "sku"), &mut offers);
            }
        }
    }
    let variants = label_offers(offers);

    Partial {
        title,
        description,
        images,
        variants,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn collect_images(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(url) if !url.trim().is_empty() => out.push(url.trim().to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_images(item, out)),
        Value::Object(obj) => {
            if let Some(url) = obj.get("url").or_else(|| obj.get("contentUrl")) {
                collect_images(url, out);
            }
        }
        _ => {}
    }
}

struct Offer {
    label: Option<String>,
    price: Money,
    sku: Option<String>,
    variant_id: Option<String>,
}

/// Offers carry major-unit prices. An `AggregateOffer` contributes its
/// `lowPrice` when no nested offers are listed.
fn collect_offers(
    offers: &Value,
    fallback_label: &str,
    fallback_sku: Option<String>,
    out: &mut Vec<Offer>,
) {
    match offers {
        Value::Array(items) => {
            for item in items {
                collect_offers(item, fallback_label, fallback_sku.clone(), out);
            }
        }
        Value::Object(obj) => {
            if let Some(nested) = obj.get("offers") {
                collect_offers(nested, fallback_label, fallback_sku, out);
                return;
            }
            let price = obj
                .get("price")
                .or_else(|| obj.get("lowPrice"))
                .and_then(price_value);
            let Some(price) = price else { return };

            out.push(Offer {
                label: str_field(offers, "name")
                    .or_else(|| Some(fallback_label.to_string()).filter(|l| !l.is_empty())),
                price,
                sku: str_field(offers, "sku").or(fallback_sku),
                variant_id: str_field(offers, "url").and_then(|u| variant_param(&u)),
            });
        }
        _ => {}
    }
}

/// Themes emit one unnamed offer per variant. When several are unnamed they
/// are told apart by sku, then by the `?variant=` id of their url.
fn label_offers(offers: Vec<Offer>) -> Vec<ScrapedVariant> {
    let unnamed = offers.iter().filter(|o| o.label.is_none()).count();
    offers
        .into_iter()
        .map(|o| {
            let label = o
                .label
                .or_else(|| {
                    if unnamed > 1 {
                        o.sku.clone().or_else(|| o.variant_id.clone())
                    } else {
                        None
                    }
                })
                .unwrap_or_else(|| DEFAULT_LABEL.to_string());
            ScrapedVariant {
                label,
                price: o.price,
                compare_at_price: None,
                sku: o.sku,
            }
        })
        .collect()
}

fn variant_param(raw: &str) -> Option<String> {
    let url = Url::parse(raw)
        .or_else(|_| Url::parse("https://storefront.invalid/")?.join(raw))
        .ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "variant")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

fn price_value(value: &Value) -> Option<Money> {
    match value {
        Value::String(s) => Money::parse_major(s),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Money::from_cents((f * 100.0).round() as i64)),
        _ => None,
    }
}

/// Variant names in a ProductGroup usually repeat the group name,
/// e.g. "Lawn Suit - Small".
fn strip_group_prefix(name: &str, group: Option<&str>) -> String {
    group
        .and_then(|g| name.strip_prefix(g))
        .map(|rest| rest.trim_start_matches([' ', '-', '/', '|']).trim())
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
        .to_string()
}
