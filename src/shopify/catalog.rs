use anyhow::{bail, Result};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{queries, AdminClient, Connection};
use crate::error::ShopifyError;

const GID_PREFIX: &str = "gid://shopify/Collection/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: String,
    pub title: String,
}

/// Manual collections and existing product tags of the target store.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub collections: Vec<Collection>,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogData {
    collections: Connection<CollectionNode>,
    shop: ShopTags,
}

#[derive(Debug, Deserialize)]
struct CollectionNode {
    id: String,
    title: String,
    #[serde(rename = "ruleSet", default)]
    rule_set: Option<RuleSet>,
}

#[derive(Debug, Deserialize)]
struct RuleSet {
    #[serde(default)]
    rules: Vec<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct ShopTags {
    #[serde(rename = "productTags")]
    product_tags: Connection<String>,
}

#[derive(Debug, Deserialize)]
struct PublicationsData {
    publications: Connection<IdNode>,
}

#[derive(Debug, Deserialize)]
struct IdNode {
    id: String,
}

/// Smart collections (those with rules) cannot take products by hand and
/// are left out.
pub async fn fetch_collections_and_tags(client: &AdminClient) -> Result<Catalog, ShopifyError> {
    let data: CatalogData = client.execute("catalog", queries::CATALOG, json!({})).await?;

    let collections: Vec<Collection> = data
        .collections
        .into_nodes()
        .into_iter()
        .filter(|c| c.rule_set.as_ref().map_or(true, |r| r.rules.is_empty()))
        .map(|c| Collection {
            id: c.id,
            title: c.title,
        })
        .collect();

    let mut tags = data.shop.product_tags.into_nodes();
    tags.sort();

    info!("{} manual collections, {} tags", collections.len(), tags.len());
    Ok(Catalog { collections, tags })
}

pub async fn publication_ids(client: &AdminClient) -> Result<Vec<String>, ShopifyError> {
    let data: PublicationsData = client
        .execute("publications", queries::PUBLICATIONS, json!({}))
        .await?;
    Ok(data.publications.into_nodes().into_iter().map(|n| n.id).collect())
}

impl Catalog {
    /// Map `--collection` arguments to ids. Accepts collection gids as-is and
    /// titles case-insensitively.
    pub fn resolve_collections(&self, wanted: &[String]) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for name in wanted {
            let name = name.trim();
            let id = if name.starts_with(GID_PREFIX) {
                name.to_string()
            } else {
                match self
                    .collections
                    .iter()
                    .find(|c| c.title.eq_ignore_ascii_case(name))
                {
                    Some(c) => c.id.clone(),
                    None => bail!(
                        "no manual collection titled {:?}; available: {}",
                        name,
                        self.collections
                            .iter()
                            .map(|c| c.title.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }
            };
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn keeps_only_manual_collections_and_sorts_tags() {
        let server = MockServer::start().await;
        let body = std::fs::read_to_string("tests/fixtures/catalog.json").unwrap();
        Mock::given(method("POST"))
            .and(body_string_contains("productTags"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client =
            AdminClient::with_endpoint(&test_settings("x.myshopify.com"), server.uri()).unwrap();
        let catalog = fetch_collections_and_tags(&client).await.unwrap();

        let titles: Vec<_> = catalog.collections.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["New Arrivals", "Eid Edit"]);
        assert_eq!(catalog.tags, vec!["bridal", "lawn", "sale"]);
    }

    #[tokio::test]
    async fn publications_are_listed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("publications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"publications": {"edges": [
                    {"node": {"id": "gid://shopify/Publication/1"}},
                    {"node": {"id": "gid://shopify/Publication/2"}}
                ]}}
            })))
            .mount(&server)
            .await;

        let client =
            AdminClient::with_endpoint(&test_settings("x.myshopify.com"), server.uri()).unwrap();
        let ids = publication_ids(&client).await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn resolves_titles_and_gids() {
        let catalog = Catalog {
            collections: vec![
                Collection {
                    id: "gid://shopify/Collection/1".into(),
                    title: "New Arrivals".into(),
                },
                Collection {
                    id: "gid://shopify/Collection/2".into(),
                    title: "Eid Edit".into(),
                },
            ],
            tags: Vec::new(),
        };
        let ids = catalog
            .resolve_collections(&[
                "eid edit".into(),
                "gid://shopify/Collection/9".into(),
                "Eid Edit".into(),
            ])
            .unwrap();
        assert_eq!(ids, vec!["gid://shopify/Collection/2", "gid://shopify/Collection/9"]);

        let err = catalog.resolve_collections(&["Winter".into()]).unwrap_err();
        assert!(err.to_string().contains("New Arrivals"));
    }
}
