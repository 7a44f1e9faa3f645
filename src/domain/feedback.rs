//! Feedback events attached to previously logged requests

use crate::domain::types::{FeedbackKey, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const RATING_KEY: &str = "rating";
pub const PROPERTY_KEY_PREFIX: &str = "property:";

/// Post-hoc annotation of a logged request, as submitted by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Body of one durable queue message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackQueueMessage {
    pub feedback: FeedbackPayload,
}

/// One row of the feedback table, unique on `(request_id, feedback_key)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub request_id: RequestId,
    pub feedback_key: FeedbackKey,
    pub value: Value,
    pub created_at: DateTime<Utc>,
}

impl FeedbackPayload {
    pub fn has_fields(&self) -> bool {
        self.rating.is_some() || !self.properties.is_empty()
    }

    /// Flatten into rows. Property names that would produce an invalid key
    /// are skipped.
    pub fn into_records(self) -> Vec<FeedbackRecord> {
        let mut records = Vec::with_capacity(self.properties.len() + 1);

        if let Some(rating) = self.rating {
            if let Ok(key) = FeedbackKey::try_new(RATING_KEY) {
                records.push(FeedbackRecord {
                    request_id: self.request_id,
                    feedback_key: key,
                    value: Value::Bool(rating),
                    created_at: self.created_at,
                });
            }
        }

        for (name, value) in self.properties {
            if name.trim().is_empty() {
                continue;
            }
            if let Ok(key) = FeedbackKey::try_new(format!("{PROPERTY_KEY_PREFIX}{}", name.trim())) {
                records.push(FeedbackRecord {
                    request_id: self.request_id,
                    feedback_key: key,
                    value,
                    created_at: self.created_at,
                });
            }
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_rating_and_properties_into_records() {
        let request_id = RequestId::generate();
        let payload = FeedbackPayload {
            request_id,
            rating: Some(true),
            properties: BTreeMap::from([
                ("source".to_string(), json!("ui")),
                ("  ".to_string(), json!("ignored")),
            ]),
            created_at: Utc::now(),
        };

        let records = payload.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].feedback_key.as_ref(), "rating");
        assert_eq!(records[0].value, json!(true));
        assert_eq!(records[1].feedback_key.as_ref(), "property:source");
        assert!(records.iter().all(|r| r.request_id == request_id));
    }

    #[test]
    fn deserializes_minimal_queue_message() {
        let id = RequestId::generate();
        let raw = json!({"feedback": {"request_id": id, "rating": false}});
        let message: FeedbackQueueMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(message.feedback.request_id, id);
        assert_eq!(message.feedback.rating, Some(false));
        assert!(message.feedback.has_fields());
    }

    #[test]
    fn payload_without_fields_has_no_records() {
        let payload = FeedbackPayload {
            request_id: RequestId::generate(),
            rating: None,
            properties: BTreeMap::new(),
            created_at: Utc::now(),
        };
        assert!(!payload.has_fields());
        assert!(payload.into_records().is_empty());
    }
}
