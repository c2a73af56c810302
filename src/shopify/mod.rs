pub mod catalog;
pub mod queries;
pub mod upload;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::ShopifyError;
use crate::fetch::{backoff_delay, is_retryable};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const BASE_BACKOFF_MS: u64 = 1000;

/// Mutation-level validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

/// `edges { node { .. } }` wrapper used by every connection.
#[derive(Debug, Deserialize)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

impl<T> Connection<T> {
    pub fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|e| e.node).collect()
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<Value>,
}

impl GraphQlError {
    fn is_throttled(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.get("code"))
            .and_then(Value::as_str)
            == Some("THROTTLED")
    }
}

pub fn check_user_errors(op: &'static str, errors: Vec<UserError>) -> Result<(), ShopifyError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ShopifyError::UserErrors { op, errors })
    }
}

/// Admin GraphQL endpoint of the target store.
#[derive(Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    base_backoff: Duration,
}

impl AdminClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Self::with_endpoint(settings, settings.graphql_endpoint())
    }

    pub(crate) fn with_endpoint(settings: &Settings, endpoint: String) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut token = HeaderValue::from_str(&settings.access_token)?;
        token.set_sensitive(true);
        headers.insert(ACCESS_TOKEN_HEADER, token);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint,
            max_retries: settings.max_retries,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    /// Run one operation and decode its `data` into `T`. Throttling and
    /// transient HTTP failures are retried with exponential backoff.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        op: &'static str,
        query: &str,
        variables: Value,
    ) -> Result<T, ShopifyError> {
        let payload = json!({ "query": query, "variables": variables });
        let mut attempt = 0;

        loop {
            debug!("graphql {} (attempt {})", op, attempt + 1);
            let response = self.http.post(&self.endpoint).json(&payload).send().await?;
            let status = response.status();

            if !status.is_success() {
                if is_retryable(status) && attempt < self.max_retries {
                    self.backoff(op, attempt, &format!("HTTP {}", status.as_u16())).await;
                    attempt += 1;
                    continue;
                }
                let body = response.text().await.unwrap_or_default();
                return Err(ShopifyError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let body: GraphQlResponse = response.json().await?;
            if !body.errors.is_empty() {
                if body.errors.iter().all(GraphQlError::is_throttled) {
                    if attempt < self.max_retries {
                        self.backoff(op, attempt, "throttled").await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ShopifyError::Throttled(self.max_retries));
                }
                let messages = body
                    .errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ShopifyError::GraphQl(messages));
            }

            let data = body.data.ok_or(ShopifyError::MissingData(op))?;
            return serde_json::from_value(data).map_err(|source| ShopifyError::Decode { op, source });
        }
    }

    async fn backoff(&self, op: &str, attempt: u32, reason: &str) {
        let delay = backoff_delay(self.base_backoff, attempt);
        warn!(
            "{} {} (attempt {}/{}), backing off {:.1}s",
            op,
            reason,
            attempt + 1,
            self.max_retries,
            delay.as_secs_f64()
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct ShopName {
        shop: Shop,
    }

    #[derive(Debug, Deserialize)]
    struct Shop {
        name: String,
    }

    async fn client(server: &MockServer) -> AdminClient {
        AdminClient::with_endpoint(&test_settings("x.myshopify.com"), server.uri())
            .unwrap()
            .with_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn sends_token_and_decodes_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Shopify-Access-Token", "shpat_test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"shop": {"name": "Kinza"}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let out: ShopName = client(&server)
            .await
            .execute("shop", "{ shop { name } }", json!({}))
            .await
            .unwrap();
        assert_eq!(out.shop.name, "Kinza");
    }

    #[tokio::test]
    async fn retries_when_throttled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"shop": {"name": "Kinza"}}})),
            )
            .mount(&server)
            .await;

        let out: ShopName = client(&server)
            .await
            .execute("shop", "{ shop { name } }", json!({}))
            .await
            .unwrap();
        assert_eq!(out.shop.name, "Kinza");
    }

    #[tokio::test]
    async fn gives_up_when_throttling_persists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]
            })))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .execute::<ShopName>("shop", "{ shop { name } }", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopifyError::Throttled(2)));
    }

    #[tokio::test]
    async fn response_without_data_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .execute::<ShopName>("shop", "{ shop { name } }", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopifyError::MissingData("shop")));
    }

    #[tokio::test]
    async fn graphql_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Field 'nope' doesn't exist on type 'Shop'"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .execute::<ShopName>("shop", "{ shop { nope } }", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopifyError::GraphQl(ref m) if m.contains("nope")));
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .execute::<ShopName>("shop", "{ shop { name } }", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopifyError::Status { status: 401, .. }));
    }

    #[test]
    fn empty_user_errors_pass() {
        assert!(check_user_errors("productSet", Vec::new()).is_ok());
        let err = check_user_errors(
            "productSet",
            vec![UserError {
                field: None,
                message: "bad".into(),
            }],
        );
        assert!(err.is_err());
    }
}
