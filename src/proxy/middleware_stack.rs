//! Middleware stack builder for clean composition

use crate::proxy::middleware::{logging_middleware, request_id_middleware};
use axum::{middleware::from_fn, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

/// Headroom above the upstream timeout before the whole request is abandoned
const REQUEST_DEADLINE_GRACE: Duration = Duration::from_secs(5);

pub struct GatewayMiddlewareStack {
    request_deadline: Duration,
}

impl GatewayMiddlewareStack {
    pub fn new(upstream_timeout: Duration) -> Self {
        Self {
            request_deadline: upstream_timeout + REQUEST_DEADLINE_GRACE,
        }
    }

    /// Apply the middleware stack to a router
    ///
    /// Outer to inner:
    /// 1. Request ID generation/propagation
    /// 2. Logging (with request ID)
    /// 3. Overall request deadline
    pub fn apply_to_router<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(
            ServiceBuilder::new()
                .layer(from_fn(request_id_middleware))
                .layer(from_fn(logging_middleware))
                .layer(TimeoutLayer::new(self.request_deadline)),
        )
    }
}
