//! Edge request handling
//!
//! The HTTP surface of the gateway: request wrapping, worker-role dispatch,
//! the provider proxy pipeline (rate limit, cache, vault, forward) and the
//! management API. Exchange logging leaves the response path through
//! `crate::async_log`.

pub mod cache;
pub mod error_response;
pub mod headers;
pub mod hot_path;
pub mod management;
pub mod middleware;
pub mod middleware_stack;
pub mod pipeline;
pub mod provider_table;
pub mod rate_limit;
pub mod request_wrapper;
pub mod service;
pub mod types;
pub mod url_resolver;
pub mod vault;

pub use cache::{CachedResponse, ResponseCache};
pub use error_response::ErrorResponse;
pub use hot_path::{Forwarder, OutgoingRequest, UpstreamForwarder, UpstreamResponse};
pub use management::{AuthConfig, ManagementPipeline};
pub use pipeline::{Pipeline, PipelineSet, ProxyPipeline};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use request_wrapper::{compute_cache_key, RequestWrapper};
pub use service::GatewayService;
pub use types::{ProxyError, ProxyResult, TargetUrl};
pub use vault::ProviderKeyVault;
