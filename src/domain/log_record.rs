//! Async log wire payload
//!
//! This is the body POSTed to the logging endpoint after every upstream call,
//! and the body the management API accepts on its `/v1/log` routes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A complete captured exchange: what was sent, what came back, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncLogRequest {
    pub provider_request: ProviderRequest,
    pub provider_response: ProviderResponse,
    pub timing: Timing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub url: String,
    pub json: Value,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub json: Value,
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start_time: TimePoint,
    pub end_time: TimePoint,
}

/// Milliseconds since the Unix epoch split into whole seconds and remainder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePoint {
    pub seconds: i64,
    pub milliseconds: i64,
}

impl TimePoint {
    pub fn from_epoch_millis(millis: i64) -> Self {
        Self {
            seconds: millis.div_euclid(1000),
            milliseconds: millis.rem_euclid(1000),
        }
    }

    pub fn epoch_millis(&self) -> i64 {
        self.seconds * 1000 + self.milliseconds
    }
}

impl Timing {
    pub fn from_epoch_millis(start: i64, end: i64) -> Self {
        Self {
            start_time: TimePoint::from_epoch_millis(start),
            end_time: TimePoint::from_epoch_millis(end),
        }
    }

    pub fn duration_millis(&self) -> i64 {
        self.end_time.epoch_millis() - self.start_time.epoch_millis()
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Interpret a captured body as JSON.
///
/// Empty bodies become `{}`; bodies that are not JSON are kept as a string
/// so nothing is dropped from the log.
pub fn body_as_json(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
