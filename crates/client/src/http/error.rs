//! HTTP transport error types.

use std::sync::Arc;

/// Errors from the HTTP page transport.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// No endpoint configured.
    #[error("missing endpoint: SIFT_ENDPOINT not set")]
    MissingEndpoint,

    /// Endpoint or page query cannot form a valid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Authentication failed (invalid API key).
    #[error("authentication failed: invalid API key")]
    AuthError,

    /// Rate limited by the remote.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response body is not JSON.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { HttpError::Timeout } else { HttpError::Network(Arc::new(err)) }
    }
}

impl HttpError {
    /// Whether the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::RateLimited | HttpError::Timeout | HttpError::Network(_) => true,
            HttpError::Http { status } => *status >= 500,
            _ => false,
        }
    }
}
