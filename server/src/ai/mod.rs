//! Assistant reply-generation collaborator.
//!
//! Thin HTTP client around the text-generation service: a prompt string in,
//! generated text out. Callers treat every failure as best-effort; a failed
//! or slow generation never blocks or fails the user's own message.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AssistantConfig;

/// Upper bound on one generation round-trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

pub struct ReplyClient {
    http: reqwest::Client,
    api_url: String,
    model: String,
}

impl ReplyClient {
    pub fn new(cfg: &AssistantConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: cfg.api_url.clone(),
            model: cfg.model.clone(),
        })
    }

    /// Generate a reply for a prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, reqwest::Error> {
        let response: GenerateResponse = self
            .http
            .post(&self.api_url)
            .json(&GenerateRequest {
                prompt,
                model: &self.model,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.text)
    }
}
