//! Response cache over a KV namespace
//!
//! Entries are keyed by the request's cache key and expire after the
//! configured TTL. Concurrent misses for the same key may both populate the
//! entry; the last write wins.

use crate::domain::CacheKey;
use crate::kv::{KvError, KvStore};
use crate::proxy::hot_path::UpstreamResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const KEY_PREFIX: &str = "cache:";

/// Serialized form of a cached upstream response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Base64 so binary bodies survive the JSON encoding
    pub body: String,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn from_upstream(response: &UpstreamResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Self {
            status: response.status.as_u16(),
            headers,
            body: STANDARD.encode(&response.body),
            cached_at: Utc::now(),
        }
    }

    pub fn into_upstream(self) -> Result<UpstreamResponse, KvError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| KvError::Codec(format!("cached status: {e}")))?;
        let body = STANDARD
            .decode(self.body.as_bytes())
            .map_err(|e| KvError::Codec(format!("cached body: {e}")))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| KvError::Codec(format!("cached header name: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| KvError::Codec(format!("cached header value: {e}")))?;
            headers.insert(name, value);
        }

        Ok(UpstreamResponse::new(status, headers, Bytes::from(body)))
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn get(&self, key: &CacheKey) -> Result<Option<UpstreamResponse>, KvError> {
        let Some(raw) = self.store.get(&storage_key(key)).await? else {
            return Ok(None);
        };

        let cached: CachedResponse = serde_json::from_slice(&raw)?;
        cached.into_upstream().map(Some)
    }

    /// Store a successful upstream response; non-2xx responses are ignored
    pub async fn put(&self, key: &CacheKey, response: &UpstreamResponse) -> Result<bool, KvError> {
        if !response.is_success() {
            return Ok(false);
        }

        let encoded = serde_json::to_vec(&CachedResponse::from_upstream(response))?;
        self.store
            .put(&storage_key(key), Bytes::from(encoded), Some(self.ttl))
            .await?;
        Ok(true)
    }
}

fn storage_key(key: &CacheKey) -> String {
    format!("{KEY_PREFIX}{key}")
}
