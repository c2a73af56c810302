use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

use super::variants::ProductJs;
use super::Partial;

static THEME_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        r#"script[data-product-json]"#,
        r#"script[id^="ProductJson"]"#,
        r#"script.product-json"#,
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

/// Product JSON that themes embed for their own variant pickers.
pub fn extract(doc: &Html) -> Option<Partial> {
    for selector in THEME_SELECTORS.iter() {
        for element in doc.select(selector) {
            let text = element.text().collect::<String>();
            if let Some(partial) = parse_embedded(&text) {
                return Some(partial);
            }
        }
    }
    None
}

fn parse_embedded(text: &str) -> Option<Partial> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    // Some themes nest the product under a "product" key
    let inner = value.get("product").unwrap_or(&value);
    let js = ProductJs::deserialize(inner).ok()?;
    let partial = Partial::from(js);
    if partial.title.is_none() && partial.variants.is_empty() {
        return None;
    }
    Some(partial)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_product_json_script() {
        let html = r#"
            <html><body>
            <script type="application/json" data-product-json>
            {"id": 1, "title": "Chiffon Dupatta", "description": "<p>Soft</p>",
             "images": ["//cdn.shopify.com/a.jpg"],
             "variants": [{"title": "One Size", "price": 250000, "compare_at_price": null, "sku": "CD-1"}]}
            </script>
            </body></html>
        "#;
        let partial = extract(&Html::parse_document(html)).unwrap();
        assert_eq!(partial.title.as_deref(), Some("Chiffon Dupatta"));
        assert_eq!(partial.variants.len(), 1);
        assert_eq!(partial.variants[0].price.to_string(), "2500.00");
    }

    #[test]
    fn product_json_id_with_wrapper() {
        let html = r#"
            <script type="application/json" id="ProductJson-template">
            {"product": {"title": "Silk Shirt", "variants": [{"public_title": "M", "price": 1000}]}}
            </script>
        "#;
        let partial = extract(&Html::parse_document(html)).unwrap();
        assert_eq!(partial.title.as_deref(), Some("Silk Shirt"));
        assert_eq!(partial.variants[0].label, "M");
    }

    #[test]
    fn skips_invalid_and_unrelated_json() {
        let html = r#"
            <script data-product-json>{not json</script>
            <script class="product-json">{"settings": {"color": "red"}}</script>
        "#;
        assert!(extract(&Html::parse_document(html)).is_none());
    }
}
