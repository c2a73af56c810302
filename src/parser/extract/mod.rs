pub mod html;
pub mod jsonld;
pub mod theme;
pub mod variants;

use super::ScrapedVariant;

/// Whatever one data source could say about a product.
#[derive(Debug, Default, Clone)]
pub struct Partial {
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<ScrapedVariant>,
}
