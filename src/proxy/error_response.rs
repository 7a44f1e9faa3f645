//! Structured error responses
//!
//! Every gateway-generated failure has the same shape:
//! `{"relay-message": ..., "support": ..., "relay-error": <CODE>}` with a
//! `relay-error: true` header, so clients can tell gateway errors from
//! upstream ones.

use crate::proxy::headers::{content_types, RETRY_AFTER, X_ERROR, X_REQUEST_ID};
use crate::proxy::types::ProxyError;
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

pub const SUPPORT_MESSAGE: &str =
    "If this keeps happening, open an issue at https://github.com/llm-relay/llm_relay/issues";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message
    #[serde(rename = "relay-message")]
    pub message: String,
    pub support: String,
    /// Machine-readable error code
    #[serde(rename = "relay-error")]
    pub code: String,
    #[serde(skip)]
    pub request_id: Option<String>,
    #[serde(skip)]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            support: SUPPORT_MESSAGE.to_string(),
            code: code.into(),
            request_id: None,
            retry_after_seconds: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn into_response_with_status(self, status: StatusCode) -> Response {
        let request_id = self.request_id.clone();
        let retry_after = self.retry_after_seconds;
        let body = serde_json::to_vec(&self).unwrap_or_default();

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static(content_types::APPLICATION_JSON_UTF8),
        );
        headers.insert(X_ERROR, HeaderValue::from_static("true"));

        if let Some(id) = request_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
            headers.insert(X_REQUEST_ID, id);
        }
        if let Some(seconds) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
        }

        response
    }
}

/// Extension trait for consistent error formatting
pub trait ErrorResponseExt {
    fn to_error_response(&self) -> ErrorResponse;

    fn status_code(&self) -> StatusCode;
}

impl ErrorResponseExt for ProxyError {
    fn to_error_response(&self) -> ErrorResponse {
        use ProxyError::*;

        let code = match self {
            InvalidRequest(_) => "INVALID_REQUEST",
            RequestTooLarge { .. } => "REQUEST_TOO_LARGE",
            Classification(_) => "CLASSIFICATION_ERROR",
            UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            RateLimited { .. } => "RATE_LIMITED",
            InvalidTargetUrl(_) => "INVALID_TARGET_URL",
            Upstream(_) => "UPSTREAM_ERROR",
            UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Unauthorized => "UNAUTHORIZED",
            NotFound(_) => "NOT_FOUND",
            Serialization(_) => "SERIALIZATION_ERROR",
            Http(_) | Internal(_) => "INTERNAL_ERROR",
        };

        let mut response = ErrorResponse::new(code, self.to_string());
        if let RateLimited {
            retry_after_seconds,
            ..
        } = self
        {
            response.retry_after_seconds = Some(*retry_after_seconds);
        }
        response
    }

    fn status_code(&self) -> StatusCode {
        use ProxyError::*;

        match self {
            InvalidRequest(_) | InvalidTargetUrl(_) => StatusCode::BAD_REQUEST,
            RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Unauthorized => StatusCode::UNAUTHORIZED,
            NotFound(_) => StatusCode::NOT_FOUND,
            Classification(_)
            | UnsupportedProvider(_)
            | Upstream(_)
            | UpstreamTimeout(_)
            | Serialization(_)
            | Http(_)
            | Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.to_error_response().into_response_with_status(status)
    }
}
