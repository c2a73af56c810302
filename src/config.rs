use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_NAME: &str = "shop_mirror";
const ENV_PREFIX: &str = "SHOP_MIRROR";
const MAX_RETRIES_LIMIT: u32 = 10;

const DEFAULT_PRODUCT_TYPES: &[&str] = &[
    "Casual Pret",
    "Luxury Pret",
    "Formal",
    "Bridal",
    "Festive",
    "Luxury Lawn",
    "Summer Lawn",
    "Winter Collection",
    "Eid Collection",
    "Chiffon",
    "Silk",
    "Party Wear",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Target store domain, e.g. `my-store.myshopify.com`.
    pub shop: String,
    pub access_token: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Inventory location; the inventory steps are skipped without it.
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default = "default_category_id")]
    pub category_id: String,
    #[serde(default = "default_stock")]
    pub default_stock: i64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub price_markup_percent: u32,
    #[serde(default)]
    pub handle_suffix: bool,
    #[serde(default = "default_product_types")]
    pub product_types: Vec<String>,
    #[serde(default = "default_collection_pages")]
    pub collection_pages: usize,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default)]
    pub metafields: Vec<Metafield>,
    #[serde(default)]
    pub ai: Option<AiSettings>,
}

/// A metafield written onto every uploaded product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafield {
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiSettings {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
}

fn default_api_version() -> String {
    "2025-04".into()
}

fn default_category_id() -> String {
    "gid://shopify/TaxonomyCategory/aa-1-4".into()
}

fn default_stock() -> i64 {
    8
}

fn default_user_agent() -> String {
    "Mozilla/5.0".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_product_types() -> Vec<String> {
    DEFAULT_PRODUCT_TYPES.iter().map(|s| s.to_string()).collect()
}

fn default_collection_pages() -> usize {
    1
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/shop_mirror.sqlite")
}

fn default_ai_model() -> String {
    "gpt-4o-mini".into()
}

impl Settings {
    /// Load settings from `shop_mirror.toml` (or `path`) overlaid with
    /// `SHOP_MIRROR_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("product_types");

        Self::from_builder(Config::builder().add_source(file).add_source(env))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration (shop and access_token are required)")?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<()> {
        if self.shop.trim().is_empty() {
            bail!("shop must not be empty");
        }
        if self.access_token.trim().is_empty() {
            bail!("access_token must not be empty");
        }
        if self.collection_pages == 0 {
            bail!("collection_pages must be at least 1");
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            bail!("max_retries must be at most {}", MAX_RETRIES_LIMIT);
        }
        Ok(())
    }

    pub fn graphql_endpoint(&self) -> String {
        let shop = self
            .shop
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        format!("https://{}/admin/api/{}/graphql.json", shop, self.api_version)
    }

    /// Match `value` against the configured product types, ignoring case.
    /// Returns the configured spelling.
    pub fn validate_product_type(&self, value: &str) -> Result<String> {
        let wanted = value.trim();
        self.product_types
            .iter()
            .find(|t| t.eq_ignore_ascii_case(wanted))
            .cloned()
            .with_context(|| {
                format!(
                    "unknown product type {:?}; choose one of: {}",
                    value,
                    self.product_types.join(", ")
                )
            })
    }
}

#[cfg(test)]
pub(crate) fn test_settings(shop: &str) -> Settings {
    Settings {
        shop: shop.to_string(),
        access_token: "shpat_test".into(),
        api_version: default_api_version(),
        location_id: Some("gid://shopify/Location/1".into()),
        category_id: default_category_id(),
        default_stock: default_stock(),
        user_agent: default_user_agent(),
        accept_invalid_certs: false,
        timeout_secs: 5,
        max_retries: 2,
        price_markup_percent: 0,
        handle_suffix: false,
        product_types: default_product_types(),
        collection_pages: 1,
        db_path: default_db_path(),
        metafields: Vec::new(),
        ai: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings> {
        Settings::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let s = from_toml(
            r#"
            shop = "kinzav2.myshopify.com"
            access_token = "shpat_abc"
            "#,
        )
        .unwrap();
        assert_eq!(s.api_version, "2025-04");
        assert_eq!(s.default_stock, 8);
        assert_eq!(s.category_id, "gid://shopify/TaxonomyCategory/aa-1-4");
        assert_eq!(s.product_types.len(), 12);
        assert!(s.location_id.is_none());
        assert!(!s.accept_invalid_certs);
        assert!(s.ai.is_none());
        assert_eq!(
            s.graphql_endpoint(),
            "https://kinzav2.myshopify.com/admin/api/2025-04/graphql.json"
        );
    }

    #[test]
    fn metafields_and_ai_section() {
        let s = from_toml(
            r#"
            shop = "x.myshopify.com"
            access_token = "t"
            price_markup_percent = 20

            [[metafields]]
            namespace = "custom"
            key = "source"
            type = "single_line_text_field"
            value = "import"

            [ai]
            endpoint = "https://api.example.com/v1"
            api_key = "sk-test"
            "#,
        )
        .unwrap();
        assert_eq!(s.price_markup_percent, 20);
        assert_eq!(s.metafields.len(), 1);
        assert_eq!(s.metafields[0].kind, "single_line_text_field");
        let ai = s.ai.unwrap();
        assert_eq!(ai.model, "gpt-4o-mini");
    }

    #[test]
    fn missing_token_is_rejected() {
        assert!(from_toml(r#"shop = "x.myshopify.com""#).is_err());
        assert!(from_toml("shop = \"x.myshopify.com\"\naccess_token = \"  \"").is_err());
    }

    #[test]
    fn excessive_retries_are_rejected() {
        let base = "shop = \"x.myshopify.com\"\naccess_token = \"t\"\n";
        assert!(from_toml(&format!("{}max_retries = 10", base)).is_ok());
        assert!(from_toml(&format!("{}max_retries = 40", base)).is_err());
    }

    #[test]
    fn product_type_matches_case_insensitively() {
        let s = test_settings("x.myshopify.com");
        assert_eq!(s.validate_product_type("luxury lawn").unwrap(), "Luxury Lawn");
        let err = s.validate_product_type("Denim").unwrap_err().to_string();
        assert!(err.contains("Party Wear"));
    }
}
