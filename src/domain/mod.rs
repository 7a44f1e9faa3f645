//! Domain types for the relay gateway
//!
//! Providers, worker roles, the async log wire format and feedback events.
//! Everything here is plain data plus pure functions; I/O lives in `proxy`,
//! `async_log`, `queue` and `infrastructure`.

pub mod feedback;
pub mod log_record;
pub mod provider;
pub mod types;
pub mod worker_role;

pub use feedback::{FeedbackPayload, FeedbackQueueMessage, FeedbackRecord};
pub use log_record::{AsyncLogRequest, ProviderRequest, ProviderResponse, TimePoint, Timing};
pub use provider::{Provider, UnsupportedProvider};
pub use types::{ApiKey, CacheKey, CallerIdentity, FeedbackKey, RequestId};
pub use worker_role::{classify, ClassificationError, WorkerRole};
