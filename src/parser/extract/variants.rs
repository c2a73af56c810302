//! The storefront's `/products/{handle}.js` endpoint.
//!
//! Themes that embed product JSON use the same shape, so `theme` reuses
//! [`ProductJs`] for the embedded script contents.

use serde::Deserialize;

use super::Partial;
use crate::money::Money;
use crate::parser::ScrapedVariant;

#[derive(Debug, Deserialize)]
pub struct ProductJs {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub featured_image: Option<ImageRef>,
    #[serde(default)]
    pub variants: Vec<VariantJs>,
}

#[derive(Debug, Deserialize)]
pub struct VariantJs {
    #[serde(default)]
    pub public_title: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    #[serde(default)]
    pub sku: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Url(String),
    Object { src: String },
}

impl ImageRef {
    fn into_url(self) -> String {
        match self {
            ImageRef::Url(u) | ImageRef::Object { src: u } => u,
        }
    }
}

/// Prices on these endpoints are integer cents. A few themes render them as
/// decimal strings instead, which are read as major units.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Cents(i64),
    Float(f64),
    Text(String),
}

impl Price {
    pub fn to_money(&self) -> Option<Money> {
        match self {
            Price::Cents(c) => Some(Money::from_cents(*c)),
            Price::Float(f) => Some(Money::from_cents(f.round() as i64)),
            Price::Text(s) if s.contains('.') => Money::parse_major(s),
            Price::Text(s) => s.trim().parse::<i64>().ok().map(Money::from_cents),
        }
    }
}

impl From<ProductJs> for Partial {
    fn from(js: ProductJs) -> Self {
        let mut images: Vec<String> = js.images.into_iter().map(ImageRef::into_url).collect();
        if images.is_empty() {
            images.extend(js.featured_image.map(ImageRef::into_url));
        }

        let variants = js
            .variants
            .into_iter()
            .filter_map(|v| {
                let price = v.price.as_ref().and_then(Price::to_money)?;
                let compare_at_price = v
                    .compare_at_price
                    .as_ref()
                    .and_then(Price::to_money)
                    .filter(|m| !m.is_zero());
                let label = [v.public_title, v.title]
                    .into_iter()
                    .flatten()
                    .map(|s| s.trim().to_string())
                    .find(|s| !s.is_empty())
                    .unwrap_or_else(|| "Default Title".to_string());
                Some(ScrapedVariant {
                    label,
                    price,
                    compare_at_price,
                    sku: v.sku.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                })
            })
            .collect();

        Partial {
            title: js.title.filter(|t| !t.trim().is_empty()),
            description: js.description.filter(|d| !d.trim().is_empty()),
            images,
            variants,
        }
    }
}
