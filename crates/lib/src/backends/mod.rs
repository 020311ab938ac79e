//! Generative-model backend clients.
//!
//! One client per backend kind, each a thin typed wrapper over the HTTP API with a
//! mandatory per-call timeout. Base URLs are injectable so tests run against a mock.

mod image;
mod text;

pub use image::{GeneratedImage, ImageBackendClient};
pub use text::TextBackendClient;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend api error: {0}")]
    Api(String),
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// True when the failure was the per-call timeout rather than a backend-side error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Request(e) if e.is_timeout())
    }
}
