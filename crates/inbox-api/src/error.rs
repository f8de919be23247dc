//! Error types for the HTTP backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authenticated (HTTP 401)")]
    Unauthorized,

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected response shape: {0}")]
    Shape(String),
}

impl ApiError {
    /// Authentication loss stops polling instead of retrying.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
