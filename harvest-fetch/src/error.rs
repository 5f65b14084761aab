//! Fetch error types.

use thiserror::Error;

/// Error type for source fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limited by the source.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after: Option<u64>,
    },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Required credentials are not configured.
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(String),

    /// Unexpected HTTP status.
    #[error("Unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },

    /// Invalid response from the source.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error.
    #[error("Core error: {0}")]
    Core(#[from] harvest_core::CoreError),
}

impl FetchError {
    /// Returns true if retrying the same request may succeed.
    ///
    /// Rate limiting, timeouts, connection problems, server errors and
    /// undecodable bodies are transient. Credential and URL problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_redirect(),
            Self::Timeout(_)
            | Self::RateLimited { .. }
            | Self::InvalidResponse(_)
            | Self::Json(_)
            | Self::Core(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408,
            Self::AuthenticationFailed(_) | Self::MissingCredentials(_) | Self::InvalidUrl(_) => {
                false
            }
        }
    }

    /// Returns true if the error means the run cannot proceed at all.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::MissingCredentials(_) | Self::InvalidUrl(_)
        )
    }
}
