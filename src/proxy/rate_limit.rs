//! Best-effort fixed-window rate limiting per caller
//!
//! Counters live in a shared KV namespace under
//! `ratelimit:{caller}:{window_start}` and expire with their window. The
//! read-then-increment is not atomic: concurrent requests from several
//! instances may slightly over- or under-count.

use crate::config::RateLimitSettings;
use crate::domain::CallerIdentity;
use crate::kv::{KvError, KvStore};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Longest window a policy may ask for; counters never outlive a day
pub const MAX_WINDOW_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub quota: u64,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid rate limit policy '{0}', expected '<quota>;w=<seconds>'")]
pub struct InvalidPolicy(pub String);

impl RateLimitPolicy {
    pub fn new(quota: u64, window_seconds: u64) -> Result<Self, InvalidPolicy> {
        if window_seconds == 0 || window_seconds > MAX_WINDOW_SECONDS {
            return Err(InvalidPolicy(format!("{quota};w={window_seconds}")));
        }
        Ok(Self {
            quota,
            window_seconds,
        })
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl FromStr for RateLimitPolicy {
    type Err = InvalidPolicy;

    /// `<quota>;w=<seconds>`, further `;key=value` segments are ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPolicy(s.to_string());
        let mut segments = s.split(';').map(str::trim);

        let quota = segments
            .next()
            .and_then(|q| q.parse::<u64>().ok())
            .ok_or_else(invalid)?;

        let window_seconds = segments
            .find_map(|segment| segment.strip_prefix("w="))
            .and_then(|w| w.trim().parse::<u64>().ok())
            .ok_or_else(invalid)?;

        Self::new(quota, window_seconds).map_err(|_| invalid())
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};w={}", self.quota, self.window_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub policy: RateLimitPolicy,
    pub remaining: u64,
    pub retry_after_seconds: u64,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    default_policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, settings: &RateLimitSettings) -> Result<Self, InvalidPolicy> {
        Ok(Self {
            store,
            default_policy: RateLimitPolicy::new(
                settings.default_quota,
                settings.default_window_seconds,
            )?,
        })
    }

    pub fn default_policy(&self) -> RateLimitPolicy {
        self.default_policy
    }

    /// Count one request for `caller` against the current window
    pub async fn check(
        &self,
        caller: &CallerIdentity,
        policy: Option<RateLimitPolicy>,
    ) -> Result<RateLimitDecision, KvError> {
        self.check_at(caller, policy, chrono::Utc::now().timestamp())
            .await
    }

    pub async fn check_at(
        &self,
        caller: &CallerIdentity,
        policy: Option<RateLimitPolicy>,
        now_epoch_seconds: i64,
    ) -> Result<RateLimitDecision, KvError> {
        let policy = policy.unwrap_or(self.default_policy);
        let now = u64::try_from(now_epoch_seconds).unwrap_or_default();
        let window_start = now - now % policy.window_seconds;
        let retry_after_seconds = window_start + policy.window_seconds - now;
        let key = format!("ratelimit:{caller}:{window_start}");

        let used = match self.store.get(&key).await? {
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|count| count.parse::<u64>().ok())
                .ok_or_else(|| KvError::Codec(format!("counter at '{key}' is not a number")))?,
            None => 0,
        };

        if used >= policy.quota {
            return Ok(RateLimitDecision {
                allowed: false,
                policy,
                remaining: 0,
                retry_after_seconds,
            });
        }

        let used = used + 1;
        self.store
            .put(
                &key,
                Bytes::from(used.to_string()),
                Some(Duration::from_secs(retry_after_seconds)),
            )
            .await?;

        Ok(RateLimitDecision {
            allowed: true,
            policy,
            remaining: policy.quota - used,
            retry_after_seconds,
        })
    }
}
