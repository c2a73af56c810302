use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::{AiSettings, Settings};

const MAX_INPUT_CHARS: usize = 4000;
const MAX_TOKENS: u32 = 600;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?```\s*$").unwrap());

/// Rewrites product descriptions through an OpenAI-compatible chat
/// completions service.
pub struct Enhancer {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl Enhancer {
    pub fn new(ai: &AiSettings, settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(60)))
            .build()?;
        Ok(Self {
            http,
            url: format!("{}/chat/completions", ai.endpoint.trim_end_matches('/')),
            api_key: ai.api_key.clone(),
            model: ai.model.clone(),
        })
    }

    pub async fn rewrite(&self, title: &str, description_html: &str) -> Result<String> {
        let source: String = description_html.chars().take(MAX_INPUT_CHARS).collect();
        let prompt = format!(
            "Write an engaging product description for an online clothing store. \
            Use simple HTML (<p>, <ul>, <li>, <strong>) and keep every factual detail \
            (fabric, pieces, measurements, care). Return ONLY the HTML.\n\n\
            Product: {}\n\nCurrent description:\n{}",
            title, source
        );

        debug!("rewriting description for {:?}", title);
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "max_tokens": MAX_TOKENS,
                "messages": [{"role": "user", "content": prompt}]
            }))
            .send()
            .await
            .context("description service unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("description service returned {}: {}", status.as_u16(), body);
        }

        let body: Value = response.json().await?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .map(strip_code_fence)
            .unwrap_or_default();
        if text.is_empty() {
            bail!("description service returned no text");
        }
        Ok(text)
    }
}

/// Models often wrap HTML in a fenced block.
fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_settings;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn enhancer(server: &MockServer) -> Enhancer {
        let ai = AiSettings {
            endpoint: format!("{}/v1/", server.uri()),
            api_key: "sk-test".into(),
            model: "gpt-4o-mini".into(),
        };
        Enhancer::new(&ai, &test_settings("x.myshopify.com")).unwrap()
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```html\n<p>Hi</p>\n```"), "<p>Hi</p>");
        assert_eq!(strip_code_fence("  <p>Hi</p> "), "<p>Hi</p>");
    }

    #[tokio::test]
    async fn returns_generated_html() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_string_contains("Lawn Suit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "```html\n<p>Soft lawn.</p>\n```"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let html = enhancer(&server)
            .rewrite("Lawn Suit", "<p>A lawn suit.</p>")
            .await
            .unwrap();
        assert_eq!(html, "<p>Soft lawn.</p>");
    }

    #[tokio::test]
    async fn service_errors_surface() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = enhancer(&server).rewrite("Lawn Suit", "").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
