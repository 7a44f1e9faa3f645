//! Gateway HTTP service
//!
//! Every request except the health check goes through the same steps:
//! build the `RequestWrapper`, which classifies the worker role from the
//! host (or the static override), then run the pipeline selected for that
//! role.
//!
//! ```rust,ignore
//! use llm_relay::proxy::GatewayService;
//!
//! let router = GatewayService::new(settings, pipelines).into_router();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8787").await?;
//! axum::serve(listener, router).await?;
//! ```

use crate::config::Settings;
use crate::proxy::headers::paths;
use crate::proxy::middleware_stack::GatewayMiddlewareStack;
use crate::proxy::pipeline::PipelineSet;
use crate::proxy::request_wrapper::RequestWrapper;
use crate::proxy::types::{ProxyError, ProxyResult};
use axum::{
    body::Body,
    extract::{Request, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, error};

pub struct GatewayService {
    settings: Arc<Settings>,
    pipelines: PipelineSet,
}

impl GatewayService {
    pub fn new(settings: Arc<Settings>, pipelines: PipelineSet) -> Self {
        Self {
            settings,
            pipelines,
        }
    }

    pub fn into_router(self) -> Router {
        let upstream_timeout = self.settings.upstream.request_timeout();

        let router = Router::new()
            .route(paths::HEALTH, get(health_handler))
            .fallback(gateway_handler)
            .with_state(Arc::new(self));

        GatewayMiddlewareStack::new(upstream_timeout).apply_to_router(router)
    }

    async fn handle(&self, request: Request<Body>) -> ProxyResult<Response> {
        let wrapper = RequestWrapper::create(request, &self.settings).await?;
        let role = wrapper.role()?;

        debug!(
            request_id = %wrapper.request_id(),
            %role,
            provider = %wrapper.provider(),
            "Request classified"
        );

        self.pipelines.select(role).handle(wrapper).await
    }
}

async fn gateway_handler(
    State(gateway): State<Arc<GatewayService>>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    gateway.handle(request).await.inspect_err(|e| {
        if !e.is_client_error() {
            error!(error = %e, "Request could not be served");
        }
    })
}

async fn health_handler() -> &'static str {
    "OK"
}
