//! Text completion backend client (messages API).
//!
//! POST {base}/v1/messages with an `x-api-key` header; single-turn user message,
//! bounded tokens and temperature; the reply is the first text content block.

use super::BackendError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.text-backend.example.com";

const MAX_TOKENS: u32 = 512;
const TEMPERATURE: f32 = 0.5;

/// Client for the text generation HTTP API.
#[derive(Clone)]
pub struct TextBackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl TextBackendClient {
    /// `timeout` bounds every call; an unbounded model call is a correctness bug.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("http client with timeout"),
        }
    }

    /// POST /v1/messages — single-turn completion. Returns the generated reply text.
    pub async fn generate(
        &self,
        model: &str,
        api_key: &str,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: model.to_string(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };
        let res = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(BackendError::Api(format!("{} {}", status, body)));
        }
        let data: MessagesResponse = res.json().await?;
        data.content
            .iter()
            .find(|b| b.typ == "text")
            .map(|b| b.text.clone())
            .ok_or_else(|| BackendError::Malformed("no text content block".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    typ: String,
    #[serde(default)]
    text: String,
}
