use thiserror::Error;

use crate::shopify::UserError;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid product url {0}")]
    InvalidUrl(String),
    #[error("invalid JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no variants found for {0}")]
    NoVariants(String),
}

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("admin api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("admin api returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("graphql errors: {0}")]
    GraphQl(String),
    #[error("{op} rejected: {}", format_user_errors(.errors))]
    UserErrors { op: &'static str, errors: Vec<UserError> },
    #[error("response to {0} carried no data")]
    MissingData(&'static str),
    #[error("still throttled after {0} retries")]
    Throttled(u32),
    #[error("unexpected response shape for {op}: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

fn format_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(|e| match &e.field {
            Some(field) if !field.is_empty() => format!("{}: {}", field.join("."), e.message),
            _ => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_render_field_path() {
        let err = ShopifyError::UserErrors {
            op: "productSet",
            errors: vec![
                UserError {
                    field: Some(vec!["input".into(), "handle".into()]),
                    message: "Handle has already been taken".into(),
                },
                UserError {
                    field: None,
                    message: "Something else".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "productSet rejected: input.handle: Handle has already been taken; Something else"
        );
    }
}
