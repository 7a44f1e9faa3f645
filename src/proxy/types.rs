//! Type definitions for the proxy module

use crate::domain::{ClassificationError, UnsupportedProvider};
use nutype::nutype;
use std::time::Duration;
use thiserror::Error;

/// Absolute upstream base URL
#[nutype(
    sanitize(trim),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://")),
    derive(Clone, Debug, Display, PartialEq, Eq, Deserialize, Serialize, AsRef),
)]
pub struct TargetUrl(String);

/// Errors produced on the request path.
///
/// Each pipeline stage documents which of these it can return; the service
/// turns them into structured JSON responses.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request body exceeds {max_size} bytes")]
    RequestTooLarge { max_size: usize },

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    UnsupportedProvider(#[from] UnsupportedProvider),

    #[error("Rate limit exceeded: {quota} requests per {window_seconds}s")]
    RateLimited {
        quota: u64,
        window_seconds: u64,
        retry_after_seconds: u64,
    },

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream request timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Client-input errors are not system faults and are logged at a lower
    /// level
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_)
                | Self::RequestTooLarge { .. }
                | Self::RateLimited { .. }
                | Self::InvalidTargetUrl(_)
                | Self::Unauthorized
                | Self::NotFound(_)
        )
    }
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
