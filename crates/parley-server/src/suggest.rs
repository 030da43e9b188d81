//! AI reply suggestion gateway.
//!
//! A stateless proxy to an external text-generation API. The call is fully
//! decoupled from the room pipeline: it has a bounded timeout, and every
//! failure mode (timeout, non-2xx, malformed payload) is converted into the
//! configured fallback suggestion by the HTTP handler rather than surfaced.

use crate::config::SuggestConfig;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Gateway errors. None of these reach the room pipeline; the handler
/// maps them all to the fallback suggestion.
#[derive(Debug, Error)]
pub enum SuggestError {
    /// No API key configured.
    #[error("No suggestion API key configured")]
    MissingApiKey,

    /// Request failed or timed out.
    #[error("Suggestion request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-2xx status.
    #[error("Suggestion API returned status {0}")]
    Status(reqwest::StatusCode),

    /// Response parsed but held no usable suggestion.
    #[error("Suggestion API returned no usable candidate")]
    MalformedPayload,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

impl GenerateResponse {
    /// First candidate's first text part, if any.
    fn into_suggestion(self) -> Option<String> {
        let text = self
            .candidates
            .into_iter()
            .next()?
            .content
            .parts
            .into_iter()
            .next()?
            .text;
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Client for the external text-generation API.
#[derive(Debug, Clone)]
pub struct SuggestClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    fallback: String,
}

impl SuggestClient {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &SuggestConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            fallback: config.fallback.clone(),
        })
    }

    /// The suggestion served when the upstream call fails.
    #[must_use]
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Ask the upstream API for a reply suggestion.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, non-2xx status, or a payload without a
    /// usable candidate. Callers convert these to the fallback suggestion.
    pub async fn try_suggest(&self, text: &str) -> Result<String, SuggestError> {
        let api_key = self.api_key.as_deref().ok_or(SuggestError::MissingApiKey)?;

        let body = json!({
            "contents": [{
                "parts": [{
                    "text": format!(
                        "Generate a natural-sounding reply to this chat message: \"{text}\""
                    )
                }]
            }]
        });

        let response = self
            .http
            .post(&self.api_url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SuggestError::Status(status));
        }

        let payload: GenerateResponse = response.json().await?;
        let suggestion = payload
            .into_suggestion()
            .ok_or(SuggestError::MalformedPayload)?;

        debug!(bytes = suggestion.len(), "Suggestion generated");
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(api_url: &str, api_key: Option<&str>) -> SuggestConfig {
        SuggestConfig {
            api_url: api_url.to_string(),
            api_key: api_key.map(String::from),
            timeout_ms: 200,
            fallback: "I'm not sure how to respond to that.".to_string(),
        }
    }

    #[test]
    fn test_payload_extraction() {
        let payload: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":" Sounds great! "}]}}]}"#,
        )
        .unwrap();
        assert_eq!(payload.into_suggestion(), Some("Sounds great!".to_string()));
    }

    #[test]
    fn test_payload_without_candidates() {
        let payload: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(payload.into_suggestion(), None);

        let payload: GenerateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(payload.into_suggestion(), None);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = SuggestClient::new(&test_config("http://127.0.0.1:9", None)).unwrap();
        assert!(matches!(
            client.try_suggest("hi").await,
            Err(SuggestError::MissingApiKey)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_an_error_not_a_panic() {
        let client =
            SuggestClient::new(&test_config("http://127.0.0.1:9", Some("test-key"))).unwrap();
        assert!(matches!(
            client.try_suggest("hi").await,
            Err(SuggestError::Http(_))
        ));
    }
}
