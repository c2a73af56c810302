use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::ScrapeError;

const BASE_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// HTTP client for reading public storefront pages.
#[derive(Clone)]
pub struct Storefront {
    http: reqwest::Client,
    max_retries: u32,
    base_backoff: Duration,
}

impl Storefront {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
        );
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()?;
        Ok(Self {
            http,
            max_retries: settings.max_retries,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.get_with_retry(url).await?;
        response.text().await.map_err(|source| ScrapeError::Http {
            url: url.to_string(),
            source,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ScrapeError> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|source| ScrapeError::Json {
            url: url.to_string(),
            source,
        })
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, ScrapeError> {
        let mut attempt = 0;
        loop {
            debug!("GET {}", url);
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|source| ScrapeError::Http {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if !is_retryable(status) || attempt >= self.max_retries {
                return Err(ScrapeError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let backoff = backoff_delay(self.base_backoff, attempt);
            warn!(
                "HTTP {} from {} (attempt {}/{}), backing off {:.1}s",
                status.as_u16(),
                url,
                attempt + 1,
                self.max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

pub(crate) fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `base * 2^attempt`, capped at one minute.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt)).min(MAX_BACKOFF)
}
