//! Image generation backend client.
//!
//! POST {base}/v1/images with an `x-api-key` header. The backend is asked for a hosted
//! URL result (`outputFormat: "url"`) so the artifact can be referenced from a callback
//! message without shipping binary data through the worker.

use super::BackendError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.image-backend.example.com";

const ASPECT_RATIO: &str = "16:9";
const OUTPUT_FORMAT: &str = "url";

/// A generated image reference returned by the backend.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub url: String,
}

/// Client for the image generation HTTP API.
#[derive(Clone)]
pub struct ImageBackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl ImageBackendClient {
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

    /// POST /v1/images — text-to-image. Returns the first generated image reference.
    pub async fn generate(
        &self,
        model: &str,
        api_key: &str,
        prompt: &str,
    ) -> Result<GeneratedImage, BackendError> {
        let url = format!("{}/v1/images", self.base_url);
        let body = ImagesRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            aspect_ratio: ASPECT_RATIO.to_string(),
            output_format: OUTPUT_FORMAT.to_string(),
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
        let data: ImagesResponse = res.json().await?;
        data.images
            .into_iter()
            .next()
            .map(|i| GeneratedImage { url: i.url })
            .ok_or_else(|| BackendError::Malformed("no images in response".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagesRequest {
    model: String,
    prompt: String,
    aspect_ratio: String,
    output_format: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    images: Vec<ImageItem>,
}

#[derive(Debug, Deserialize)]
struct ImageItem {
    url: String,
}
