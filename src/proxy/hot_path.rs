//! Upstream forwarding
//!
//! The latency-critical hop: build the outgoing request from the wrapper,
//! send it with a bounded timeout, and hand back the fully read response so
//! it can be returned, cached and logged.

use crate::proxy::headers::is_forwardable;
use crate::proxy::request_wrapper::RequestWrapper;
use crate::proxy::types::*;
use async_trait::async_trait;
use axum::body::Body;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Uri};
use std::time::{Duration, Instant};
use tracing::debug;

/// Response headers that describe the upstream connection, not the payload
const HOP_BY_HOP_RESPONSE: &[&str] = &["connection", "keep-alive", "transfer-encoding", "content-length"];

/// Fully buffered upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_response(self) -> ProxyResult<Response<Body>> {
        let mut builder = Response::builder().status(self.status);
        for (name, value) in self.headers.iter() {
            if !HOP_BY_HOP_RESPONSE.contains(&name.as_str()) {
                builder = builder.header(name, value);
            }
        }
        Ok(builder.body(Body::from(self.body))?)
    }
}

/// One outgoing call: where to send it and with which headers
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl OutgoingRequest {
    /// Copy forwardable inbound headers onto `uri`
    pub fn from_wrapper(wrapper: &RequestWrapper, uri: Uri) -> Self {
        let mut headers = HeaderMap::with_capacity(wrapper.headers().len());
        for (name, value) in wrapper.headers() {
            if is_forwardable(name.as_str()) {
                headers.append(name.clone(), value.clone());
            }
        }
        Self { uri, headers }
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }
}

/// Seam between the pipeline and the network
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        wrapper: &RequestWrapper,
        outgoing: OutgoingRequest,
    ) -> ProxyResult<UpstreamResponse>;
}

/// reqwest-backed forwarder with a per-request timeout
#[derive(Debug, Clone)]
pub struct UpstreamForwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl UpstreamForwarder {
    pub fn new(timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProxyError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Forwarder for UpstreamForwarder {
    async fn forward(
        &self,
        wrapper: &RequestWrapper,
        outgoing: OutgoingRequest,
    ) -> ProxyResult<UpstreamResponse> {
        let start_time = Instant::now();

        let request = self
            .client
            .request(wrapper.method().clone(), outgoing.uri.to_string())
            .headers(outgoing.headers)
            .body(wrapper.body().clone());

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>(UpstreamResponse::new(status, headers, body))
        };

        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProxyError::UpstreamTimeout(self.timeout))?
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;

        debug!(
            request_id = %wrapper.request_id(),
            uri = %outgoing.uri,
            status = response.status.as_u16(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Upstream responded"
        );

        Ok(response)
    }
}
