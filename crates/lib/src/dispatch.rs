//! Dispatch types: the inbound webhook payload and the unit of work handed to the worker.

use crate::routing::RouteProfile;
use serde::Deserialize;
use thiserror::Error;

/// Raw webhook body (platform slash-command payload). Immutable once parsed;
/// owned by the dispatcher until handed to the worker inside a [`DispatchTask`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    /// Platform request id. Generated when the platform omits one.
    #[serde(default)]
    pub request_id: Option<String>,

    /// User-supplied prompt text or command parameters.
    #[serde(default)]
    pub text: String,

    /// Caller-supplied URL the formatted result must be POSTed to.
    pub response_url: String,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed request body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("empty prompt text")]
    EmptyText,
    #[error("invalid callback URL: {0}")]
    InvalidCallbackUrl(String),
}

impl InboundRequest {
    /// Parse and validate a raw webhook body: required fields present, prompt
    /// non-empty, callback URL well-formed http(s).
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let req: InboundRequest = serde_json::from_slice(body)?;
        if req.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        match reqwest::Url::parse(&req.response_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(req),
            _ => Err(ValidationError::InvalidCallbackUrl(req.response_url)),
        }
    }
}

/// The unit of work handed from dispatcher to worker: the verified request plus the
/// resolved route profile. Each task is processed independently to completion or
/// failure; no state is shared between concurrent tasks.
#[derive(Debug, Clone)]
pub struct DispatchTask {
    /// Request id for log correlation (platform-supplied or generated).
    pub task_id: String,
    pub request: InboundRequest,
    pub profile: RouteProfile,
}

impl DispatchTask {
    pub fn new(request: InboundRequest, profile: RouteProfile) -> Self {
        let task_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            task_id,
            request,
            profile,
        }
    }
}
