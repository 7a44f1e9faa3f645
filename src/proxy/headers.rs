//! HTTP header constants and utilities for the gateway
//!
//! This module centralizes all header names the gateway reads or writes so
//! that the product prefix is defined in exactly one place.

use ::http::{header, HeaderMap};

/// Product name used in branded headers and error bodies
pub const PRODUCT: &str = "relay";

/// Explicit provider selection (`openai`, `azure-openai`, `anthropic`,
/// `custom-model`)
pub const X_PROVIDER: &str = "relay-provider";

/// Upstream base URL for custom-model requests
pub const X_TARGET_URL: &str = "relay-target-url";

/// Gateway credential identifying the caller; falls back to `authorization`
pub const X_AUTH: &str = "relay-auth";

/// Per-request cache opt-out (`false` disables caching for the request)
pub const X_CACHE_ENABLED: &str = "relay-cache-enabled";

/// `HIT` or `MISS` on proxied responses when caching is active
pub const X_CACHE: &str = "relay-cache";

/// Rate-limit policy override, `<quota>;w=<seconds>`
pub const X_RATE_LIMIT_POLICY: &str = "relay-ratelimit-policy";
pub const X_RATE_LIMIT_LIMIT: &str = "relay-ratelimit-limit";
pub const X_RATE_LIMIT_REMAINING: &str = "relay-ratelimit-remaining";

/// Prefix of headers copied into the log record's `meta`
pub const X_PROPERTY_PREFIX: &str = "relay-property-";

/// Set to `true` on every gateway-generated error response
pub const X_ERROR: &str = "relay-error";

/// Header name for request ID used for tracing and correlation
pub const X_REQUEST_ID: &str = "x-request-id";

/// Authorization header prefix for bearer tokens
pub const BEARER_PREFIX: &str = "Bearer ";

/// Standard header re-exports for convenience
pub use header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, RETRY_AFTER};

/// Hop-by-hop and routing headers that must not be forwarded upstream
pub const NON_FORWARDED: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

/// Well-known paths
pub mod paths {
    /// Default path when none is specified
    pub const DEFAULT: &str = "/";

    /// Health check endpoint path
    pub const HEALTH: &str = "/health";

    /// Async log ingestion paths per provider family
    pub const OPENAI_LOG: &str = "/oai/v1/log";
    pub const ANTHROPIC_LOG: &str = "/anthropic/v1/log";
    pub const CUSTOM_LOG: &str = "/custom/v1/log";

    /// Feedback submission
    pub const FEEDBACK: &str = "/v1/feedback";
}

/// Common content types
pub mod content_types {
    pub const APPLICATION_JSON: &str = "application/json";
    pub const APPLICATION_JSON_UTF8: &str = "application/json;charset=UTF-8";
}

/// Read a header as a trimmed string, ignoring non-UTF-8 values
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Strip an optional `Bearer ` prefix (case-insensitive)
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    match trimmed.get(..BEARER_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(BEARER_PREFIX) => {
            trimmed[BEARER_PREFIX.len()..].trim()
        }
        _ => trimmed,
    }
}

pub fn is_forwardable(name: &str) -> bool {
    !NON_FORWARDED.contains(&name) && !name.starts_with(PRODUCT)
}
