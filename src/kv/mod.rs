//! Key-value store access
//!
//! The cache, rate limiter and provider-key vault each sit on a `KvStore`
//! namespace. Stores are eventually consistent and shared between instances,
//! so callers must tolerate stale reads and lost updates; nothing here offers
//! compare-and-swap.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("KV store unavailable: {0}")]
    Unavailable(String),

    #[error("KV value could not be decoded: {0}")]
    Codec(String),
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Codec(err.to_string())
    }
}

/// One KV namespace
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, KvError>;

    /// Write a value, replacing whatever is there (last write wins)
    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), KvError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

/// Writes between two sweeps of expired entries
const SWEEP_EVERY_WRITES: u64 = 1024;

/// Process-local namespace with lazy TTL expiry
///
/// Expired entries are dropped when a read finds them and by a full sweep
/// every [`SWEEP_EVERY_WRITES`] writes.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicU64,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, KvError> {
        let now = Instant::now();
        match self.entries.read().get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), KvError> {
        let now = Instant::now();
        // A TTL past the clock's range never expires
        let expires_at = ttl.and_then(|ttl| now.checked_add(ttl));
        let sweep = (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY_WRITES == 0;

        let mut entries = self.entries.write();
        if sweep {
            entries.retain(|_, entry| entry.is_live(now));
        }
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}
