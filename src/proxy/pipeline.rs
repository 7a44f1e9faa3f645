//! Role-selected request pipelines
//!
//! Proxy roles run: rate limit, cache lookup, upstream forward, response
//! capture, then log dispatch off the response path. The management role
//! runs the API pipeline in `management`.

use crate::async_log::LogDispatcher;
use crate::config::Settings;
use crate::domain::log_record::{body_as_json, now_epoch_millis};
use crate::domain::{
    AsyncLogRequest, Provider, ProviderRequest, ProviderResponse, Timing, UnsupportedProvider,
    WorkerRole,
};
use crate::proxy::cache::ResponseCache;
use crate::proxy::headers::{
    AUTHORIZATION, BEARER_PREFIX, X_CACHE, X_PROVIDER, X_RATE_LIMIT_LIMIT,
    X_RATE_LIMIT_REMAINING,
};
use crate::proxy::hot_path::{Forwarder, OutgoingRequest, UpstreamResponse};
use crate::proxy::provider_table::upstream_base;
use crate::proxy::rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
use crate::proxy::request_wrapper::RequestWrapper;
use crate::proxy::types::{ProxyError, ProxyResult};
use crate::proxy::url_resolver::UrlResolver;
use crate::proxy::vault::ProviderKeyVault;
use async_trait::async_trait;
use axum::body::Body;
use http::{HeaderMap, HeaderValue, Response, Uri};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn handle(&self, wrapper: RequestWrapper) -> ProxyResult<Response<Body>>;
}

/// Pipelines by role, built once per process
#[derive(Clone)]
pub struct PipelineSet {
    proxy: Arc<dyn Pipeline>,
    management: Arc<dyn Pipeline>,
}

impl PipelineSet {
    pub fn new(proxy: Arc<dyn Pipeline>, management: Arc<dyn Pipeline>) -> Self {
        Self { proxy, management }
    }

    pub fn select(&self, role: WorkerRole) -> &Arc<dyn Pipeline> {
        match role {
            WorkerRole::OpenAiProxy | WorkerRole::AnthropicProxy => &self.proxy,
            WorkerRole::ManagementApi => &self.management,
        }
    }
}

#[derive(Clone)]
pub struct ProxyPipeline {
    settings: Arc<Settings>,
    rate_limiter: Option<RateLimiter>,
    cache: Option<ResponseCache>,
    vault: Option<ProviderKeyVault>,
    forwarder: Arc<dyn Forwarder>,
    logs: LogDispatcher,
}

impl ProxyPipeline {
    pub fn new(settings: Arc<Settings>, forwarder: Arc<dyn Forwarder>, logs: LogDispatcher) -> Self {
        Self {
            settings,
            rate_limiter: None,
            cache: None,
            vault: None,
            forwarder,
            logs,
        }
    }

    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_vault(mut self, vault: ProviderKeyVault) -> Self {
        self.vault = Some(vault);
        self
    }

    /// `Ok(None)` when limiting is off or the store failed (fail open)
    async fn check_rate_limit(
        &self,
        wrapper: &RequestWrapper,
    ) -> ProxyResult<Option<RateLimitDecision>> {
        let Some(limiter) = &self.rate_limiter else {
            return Ok(None);
        };

        let policy = wrapper
            .rate_limit_policy()
            .map(|raw| raw.parse::<RateLimitPolicy>())
            .transpose()
            .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

        let decision = match limiter.check(wrapper.caller(), policy).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(request_id = %wrapper.request_id(), error = %e, "Rate limit store unavailable, allowing request");
                return Ok(None);
            }
        };

        if !decision.allowed {
            info!(
                request_id = %wrapper.request_id(),
                caller = %wrapper.caller(),
                policy = %decision.policy,
                "Rate limit exceeded"
            );
            return Err(ProxyError::RateLimited {
                quota: decision.policy.quota,
                window_seconds: decision.policy.window_seconds,
                retry_after_seconds: decision.retry_after_seconds,
            });
        }

        Ok(Some(decision))
    }

    fn active_cache(&self, wrapper: &RequestWrapper) -> Option<&ResponseCache> {
        self.cache
            .as_ref()
            .filter(|_| self.settings.features.cache_enabled && wrapper.cache_requested())
    }

    async fn lookup_cache(&self, wrapper: &RequestWrapper) -> Option<UpstreamResponse> {
        let cache = self.active_cache(wrapper)?;
        match cache.get(wrapper.cache_key()).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(request_id = %wrapper.request_id(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn populate_cache(&self, wrapper: &RequestWrapper, response: &UpstreamResponse) {
        let Some(cache) = self.active_cache(wrapper) else {
            return;
        };
        if let Err(e) = cache.put(wrapper.cache_key(), response).await {
            warn!(request_id = %wrapper.request_id(), error = %e, "Cache write failed");
        }
    }

    async fn outgoing_request(
        &self,
        wrapper: &RequestWrapper,
        uri: Uri,
    ) -> ProxyResult<OutgoingRequest> {
        let mut outgoing = OutgoingRequest::from_wrapper(wrapper, uri);

        let Some(vault) = self
            .vault
            .as_ref()
            .filter(|_| self.settings.features.vault_enabled)
        else {
            return Ok(outgoing);
        };

        match vault.provider_key(wrapper.caller()).await {
            Ok(Some(key)) => {
                let value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{key}"))
                    .map_err(|_| ProxyError::Internal("Stored provider key is not a valid header".to_string()))?;
                outgoing.set_header(AUTHORIZATION, value);
            }
            Ok(None) => {
                debug!(request_id = %wrapper.request_id(), "No vaulted provider key, forwarding caller credentials");
            }
            Err(e) => {
                warn!(request_id = %wrapper.request_id(), error = %e, "Vault lookup failed, forwarding caller credentials");
            }
        }

        Ok(outgoing)
    }

    fn dispatch_log(
        &self,
        wrapper: &RequestWrapper,
        upstream_url: &Uri,
        response: ProviderResponse,
        timing: Timing,
    ) {
        let record = AsyncLogRequest {
            provider_request: ProviderRequest {
                url: upstream_url.to_string(),
                json: wrapper.json_body(),
                meta: request_meta(wrapper),
            },
            provider_response: response,
            timing,
        };

        // Detached: completion is not awaited and not ordered with other requests
        drop(self.logs.dispatch(record, wrapper.provider()));
    }
}

#[async_trait]
impl Pipeline for ProxyPipeline {
    async fn handle(&self, wrapper: RequestWrapper) -> ProxyResult<Response<Body>> {
        if wrapper.provider() == Provider::Unknown {
            let requested = wrapper.header(X_PROVIDER).unwrap_or(Provider::UNKNOWN);
            return Err(UnsupportedProvider(requested.to_string()).into());
        }

        let rate_limit = self.check_rate_limit(&wrapper).await?;
        let caching = self.active_cache(&wrapper).is_some();

        if let Some(hit) = self.lookup_cache(&wrapper).await {
            info!(
                request_id = %wrapper.request_id(),
                provider = %wrapper.provider(),
                cache_key = %wrapper.cache_key(),
                "Cache hit"
            );
            let mut response = hit.into_response()?;
            decorate(response.headers_mut(), Some("HIT"), rate_limit.as_ref());
            return Ok(response);
        }

        let base = upstream_base(
            wrapper.provider(),
            &self.settings.upstream,
            wrapper.target_url(),
        )?;
        let uri = UrlResolver::resolve_target_uri(&base, wrapper.path_and_query())?;
        let outgoing = self.outgoing_request(&wrapper, uri.clone()).await?;

        let start = now_epoch_millis();
        let result = self.forwarder.forward(&wrapper, outgoing).await;
        let timing = Timing::from_epoch_millis(start, now_epoch_millis());

        match result {
            Ok(upstream) => {
                self.populate_cache(&wrapper, &upstream).await;

                let captured = ProviderResponse {
                    json: body_as_json(&upstream.body),
                    status: upstream.status.as_u16(),
                    headers: header_map(&upstream.headers),
                };
                self.dispatch_log(&wrapper, &uri, captured, timing);

                info!(
                    request_id = %wrapper.request_id(),
                    provider = %wrapper.provider(),
                    status = upstream.status.as_u16(),
                    duration_ms = timing.duration_millis(),
                    "Request proxied"
                );

                let mut response = upstream.into_response()?;
                decorate(
                    response.headers_mut(),
                    caching.then_some("MISS"),
                    rate_limit.as_ref(),
                );
                Ok(response)
            }
            Err(e) => {
                warn!(
                    request_id = %wrapper.request_id(),
                    provider = %wrapper.provider(),
                    error = %e,
                    "Upstream call failed"
                );
                let captured = ProviderResponse {
                    json: json!({ "error": e.to_string() }),
                    status: 500,
                    headers: BTreeMap::new(),
                };
                self.dispatch_log(&wrapper, &uri, captured, timing);
                Err(e)
            }
        }
    }
}

fn decorate(headers: &mut HeaderMap, cache: Option<&'static str>, rate_limit: Option<&RateLimitDecision>) {
    if let Some(state) = cache {
        headers.insert(X_CACHE, HeaderValue::from_static(state));
    }
    if let Some(decision) = rate_limit {
        headers.insert(X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.policy.quota));
        headers.insert(X_RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Request properties plus correlation fields
fn request_meta(wrapper: &RequestWrapper) -> BTreeMap<String, String> {
    let mut meta = wrapper.properties();
    meta.insert("request_id".to_string(), wrapper.request_id().to_string());
    meta.insert("caller".to_string(), wrapper.caller().to_string());
    meta.insert("provider".to_string(), wrapper.provider().to_string());
    meta
}
