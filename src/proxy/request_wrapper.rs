//! Typed, immutable view of one inbound request
//!
//! Built once at the edge of the service and shared by reference with every
//! pipeline stage. Construction fails only for client-input problems
//! (no resolvable host, unreadable or oversized body). The worker role is
//! classified once here and kept, failure included, for the service to act
//! on. Provider classification never fails: unrecognised providers become
//! `Provider::Unknown` and are rejected by the stages that need one.

use crate::config::Settings;
use crate::domain::log_record::body_as_json;
use crate::domain::{
    classify, CacheKey, CallerIdentity, ClassificationError, Provider, RequestId, WorkerRole,
};
use crate::proxy::headers::{
    header_str, strip_bearer, AUTHORIZATION, HOST, X_AUTH, X_CACHE_ENABLED, X_PROPERTY_PREFIX,
    X_PROVIDER, X_RATE_LIMIT_POLICY, X_REQUEST_ID, X_TARGET_URL,
};
use crate::proxy::types::{ProxyError, ProxyResult};
use axum::body::Body;
use bytes::Bytes;
use http::{request::Parts, HeaderMap, Method, Request, Uri};
use http_body_util::BodyExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct RequestWrapper {
    request_id: RequestId,
    method: Method,
    url: Uri,
    host: String,
    headers: HeaderMap,
    body: Bytes,
    role: Result<WorkerRole, ClassificationError>,
    provider: Provider,
    cache_key: CacheKey,
    caller: CallerIdentity,
}

impl RequestWrapper {
    /// Read the body (bounded by `upstream.max_request_bytes`) and build the
    /// wrapper
    pub async fn create(request: Request<Body>, settings: &Settings) -> ProxyResult<Self> {
        let (parts, body) = request.into_parts();
        let max_size = settings.upstream.max_request_bytes;

        let body = http_body_util::Limited::new(body, max_size)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<http_body_util::LengthLimitError>() {
                    ProxyError::RequestTooLarge { max_size }
                } else {
                    ProxyError::InvalidRequest(format!("Unreadable request body: {e}"))
                }
            })?
            .to_bytes();

        Self::from_parts(parts, body, settings)
    }

    pub fn from_parts(parts: Parts, body: Bytes, settings: &Settings) -> ProxyResult<Self> {
        let host = resolve_host(&parts)?;
        let url = absolute_url(&parts.uri, &host)?;
        let role = classify(&host, settings.worker.role);
        let provider = resolve_provider(&parts.headers, role.as_ref().ok().copied());
        let path = url
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(crate::proxy::headers::paths::DEFAULT);
        let cache_key = compute_cache_key(provider, path, &body);
        let caller = caller_identity(&parts.headers);
        let request_id = header_str(&parts.headers, X_REQUEST_ID)
            .and_then(|id| uuid::Uuid::parse_str(id).ok())
            .map(RequestId::new)
            .unwrap_or_default();

        Ok(Self {
            request_id,
            method: parts.method,
            url,
            host,
            headers: parts.headers,
            body,
            role,
            provider,
            cache_key,
            caller,
        })
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Uri {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn path_and_query(&self) -> &str {
        self.url
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(crate::proxy::headers::paths::DEFAULT)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_str(&self.headers, name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json_body(&self) -> Value {
        body_as_json(&self.body)
    }

    /// Worker role from the static override or the host
    pub fn role(&self) -> Result<WorkerRole, ClassificationError> {
        self.role.clone()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    pub fn caller(&self) -> &CallerIdentity {
        &self.caller
    }

    /// Callers may opt out of caching with `relay-cache-enabled: false`
    pub fn cache_requested(&self) -> bool {
        !matches!(self.header(X_CACHE_ENABLED), Some(v) if v.eq_ignore_ascii_case("false"))
    }

    pub fn rate_limit_policy(&self) -> Option<&str> {
        self.header(X_RATE_LIMIT_POLICY)
    }

    pub fn target_url(&self) -> Option<&str> {
        self.header(X_TARGET_URL)
    }

    /// Raw gateway credential, if the caller sent one
    pub fn credential(&self) -> Option<&str> {
        self.header(X_AUTH)
            .or_else(|| self.header(AUTHORIZATION.as_str()))
            .map(strip_bearer)
            .filter(|credential| !credential.is_empty())
    }

    /// `relay-property-<name>` headers keyed by lower-cased `<name>`
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let property = name.as_str().strip_prefix(X_PROPERTY_PREFIX)?;
                let value = value.to_str().ok()?;
                (!property.is_empty()).then(|| (property.to_string(), value.to_string()))
            })
            .collect()
    }
}

fn resolve_host(parts: &Parts) -> ProxyResult<String> {
    parts
        .uri
        .authority()
        .map(|authority| authority.as_str().to_string())
        .or_else(|| header_str(&parts.headers, HOST.as_str()).map(str::to_string))
        .filter(|host| !host.is_empty())
        .ok_or_else(|| ProxyError::InvalidRequest("Request has no host".to_string()))
}

fn absolute_url(uri: &Uri, host: &str) -> ProxyResult<Uri> {
    let scheme = uri.scheme_str().unwrap_or("https");
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(crate::proxy::headers::paths::DEFAULT);

    format!("{scheme}://{host}{path_and_query}")
        .parse()
        .map_err(|e| ProxyError::InvalidRequest(format!("Malformed request URL: {e}")))
}

/// Explicit header, then the role's provider
fn resolve_provider(headers: &HeaderMap, role: Option<WorkerRole>) -> Provider {
    if let Some(name) = header_str(headers, X_PROVIDER) {
        return Provider::classify(name);
    }

    role.and_then(|role| role.default_provider())
        .unwrap_or(Provider::Unknown)
}

/// Callers are identified by a digest of their credential so raw keys never
/// reach a KV store
fn caller_identity(headers: &HeaderMap) -> CallerIdentity {
    header_str(headers, X_AUTH)
        .or_else(|| header_str(headers, AUTHORIZATION.as_str()))
        .map(strip_bearer)
        .filter(|credential| !credential.is_empty())
        .and_then(|credential| CallerIdentity::try_new(hex::encode(Sha256::digest(credential))).ok())
        .unwrap_or_else(CallerIdentity::anonymous)
}

/// Hex SHA-256 over provider, path and canonical body.
///
/// JSON bodies are re-serialized with sorted keys and no insignificant
/// whitespace, so formatting differences do not split the cache. Headers are
/// not part of the key.
pub fn compute_cache_key(provider: Provider, path_and_query: &str, body: &[u8]) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(path_and_query.as_bytes());
    hasher.update([0u8]);
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => {
            let mut canonical = Vec::with_capacity(body.len());
            write_canonical(&value, &mut canonical);
            hasher.update(&canonical);
        }
        Err(_) => hasher.update(body),
    }

    let digest = hex::encode(hasher.finalize());
    CacheKey::try_new(digest)
        .unwrap_or_else(|_| unreachable!("hex-encoded SHA-256 is always a valid cache key"))
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(value, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}
