//! Validated newtypes shared across the gateway
//!
//! These keep raw strings out of component signatures so that a cache key can
//! never be confused with a caller identity or an API key.

use nutype::nutype;
use uuid::Uuid;

/// Correlation id for one inbound request (UUID v7, time ordered)
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    AsRef
))]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

/// Lower-case hex SHA-256 digest identifying a logically equivalent request
#[nutype(
    validate(predicate = |s: &str| s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct CacheKey(String);

/// Who is calling, derived from the auth header. Used for rate limiting and
/// vault lookups. Never the raw credential.
///
/// Limited to 256 characters so it stays a sensible KV key component.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRef)
)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn anonymous() -> Self {
        Self::try_new(Self::ANONYMOUS).unwrap_or_else(|_| unreachable!("constant is non-empty"))
    }
}

/// Bearer key accepted by the management API
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, AsRef)
)]
pub struct ApiKey(String);

/// Name of one feedback field attached to a logged request ("rating",
/// "property:<name>")
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 200),
    derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, AsRef)
)]
pub struct FeedbackKey(String);
