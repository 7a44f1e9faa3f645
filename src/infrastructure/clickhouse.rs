//! Columnar analytics store
//!
//! Feedback rows land in a `ReplacingMergeTree` ordered by
//! `(request_id, feedback_key)`, and each insert carries a deduplication
//! token derived from its contents, so re-applying a batch converges to the
//! same stored state.

use crate::config::ClickHouseSettings;
use crate::domain::{AsyncLogRequest, FeedbackKey, FeedbackRecord, Provider, RequestId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Columnar store unreachable: {0}")]
    Transport(String),

    #[error("Columnar store rejected insert ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One logged exchange as stored for analytics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestLogRow {
    pub request_id: RequestId,
    pub provider: Provider,
    pub url: String,
    pub request_body: String,
    pub response_body: String,
    pub status: u16,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,
}

impl RequestLogRow {
    pub fn from_log(request_id: RequestId, provider: Provider, log: &AsyncLogRequest) -> Self {
        Self {
            request_id,
            provider,
            url: log.provider_request.url.clone(),
            request_body: log.provider_request.json.to_string(),
            response_body: log.provider_response.json.to_string(),
            status: log.provider_response.status,
            start_time_ms: log.timing.start_time.epoch_millis(),
            end_time_ms: log.timing.end_time.epoch_millis(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FeedbackRow<'a> {
    request_id: &'a RequestId,
    feedback_key: &'a FeedbackKey,
    value: String,
    #[serde(serialize_with = "serialize_datetime")]
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a FeedbackRecord> for FeedbackRow<'a> {
    fn from(record: &'a FeedbackRecord) -> Self {
        Self {
            request_id: &record.request_id,
            feedback_key: &record.feedback_key,
            value: record.value.to_string(),
            created_at: record.created_at,
        }
    }
}

fn serialize_datetime<S: serde::Serializer>(
    value: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&value.format(DATETIME_FORMAT))
}

#[async_trait]
pub trait ColumnarStore: Send + Sync {
    /// Insert or replace feedback rows; safe to repeat with the same records
    async fn upsert_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StoreError>;

    async fn insert_request_log(&self, row: &RequestLogRow) -> Result<(), StoreError>;
}

/// ClickHouse over its HTTP interface (`JSONEachRow` inserts)
#[derive(Debug, Clone)]
pub struct ClickHouseClient {
    client: reqwest::Client,
    host: String,
    settings: ClickHouseSettings,
}

impl ClickHouseClient {
    pub fn new(client: reqwest::Client, host: impl Into<String>, settings: ClickHouseSettings) -> Self {
        Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            settings,
        }
    }

    /// Create the feedback and request-log tables if they are missing
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let database = &self.settings.database;
        let feedback = format!(
            "CREATE TABLE IF NOT EXISTS {database}.{} (\
             request_id String, feedback_key String, value String, \
             created_at DateTime64(3)) \
             ENGINE = ReplacingMergeTree(created_at) ORDER BY (request_id, feedback_key)",
            self.settings.feedback_table
        );
        let request_log = format!(
            "CREATE TABLE IF NOT EXISTS {database}.{} (\
             request_id String, provider String, url String, request_body String, \
             response_body String, status UInt16, start_time_ms Int64, end_time_ms Int64, \
             created_at DateTime64(3)) \
             ENGINE = ReplacingMergeTree(created_at) ORDER BY request_id",
            self.settings.request_log_table
        );

        self.execute(&feedback, None, String::new()).await?;
        self.execute(&request_log, None, String::new()).await?;
        info!(database = %database, "Columnar store schema ready");
        Ok(())
    }

    async fn insert_rows<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for row in rows {
            body.push_str(&serde_json::to_string(row)?);
            body.push('\n');
        }
        let token = hex::encode(Sha256::digest(body.as_bytes()));
        let query = format!(
            "INSERT INTO {}.{table} FORMAT JSONEachRow",
            self.settings.database
        );

        self.execute(&query, Some(&token), body).await?;
        debug!(table, rows = rows.len(), "Columnar insert applied");
        Ok(())
    }

    async fn execute(
        &self,
        query: &str,
        deduplication_token: Option<&str>,
        body: String,
    ) -> Result<(), StoreError> {
        let mut url = format!("{}/?query={}", self.host, urlencoding::encode(query));
        if let Some(token) = deduplication_token {
            url.push_str("&insert_deduplication_token=");
            url.push_str(&urlencoding::encode(token));
        }

        let response = self
            .client
            .post(url)
            .basic_auth(&self.settings.user, Some(&self.settings.password))
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ColumnarStore for ClickHouseClient {
    async fn upsert_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StoreError> {
        let rows: Vec<FeedbackRow<'_>> = records.iter().map(FeedbackRow::from).collect();
        self.insert_rows(&self.settings.feedback_table, &rows).await
    }

    async fn insert_request_log(&self, row: &RequestLogRow) -> Result<(), StoreError> {
        self.insert_rows(&self.settings.request_log_table, std::slice::from_ref(row))
            .await
    }
}

/// Process-local store with the same replace-by-key semantics
#[derive(Debug, Default)]
pub struct InMemoryColumnarStore {
    feedback: RwLock<BTreeMap<(String, FeedbackKey), FeedbackRecord>>,
    request_logs: RwLock<BTreeMap<String, RequestLogRow>>,
}

impl InMemoryColumnarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored feedback ordered by `(request_id, feedback_key)`
    pub fn feedback(&self) -> Vec<FeedbackRecord> {
        self.feedback.read().values().cloned().collect()
    }

    pub fn request_logs(&self) -> Vec<RequestLogRow> {
        self.request_logs.read().values().cloned().collect()
    }
}

#[async_trait]
impl ColumnarStore for InMemoryColumnarStore {
    async fn upsert_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StoreError> {
        let mut feedback = self.feedback.write();
        for record in records {
            feedback.insert(
                (record.request_id.to_string(), record.feedback_key.clone()),
                record.clone(),
            );
        }
        Ok(())
    }

    async fn insert_request_log(&self, row: &RequestLogRow) -> Result<(), StoreError> {
        self.request_logs
            .write()
            .insert(row.request_id.to_string(), row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(request_id: RequestId, key: &str, value: serde_json::Value) -> FeedbackRecord {
        FeedbackRecord {
            request_id,
            feedback_key: FeedbackKey::try_new(key).unwrap(),
            value,
            created_at: Utc::now(),
        }
    }

    fn settings() -> ClickHouseSettings {
        ClickHouseSettings {
            host: None,
            user: "relay".to_string(),
            password: "secret".to_string(),
            database: "analytics".to_string(),
            feedback_table: "feedback".to_string(),
            request_log_table: "request_response_log".to_string(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_upsert_is_idempotent() {
        let store = InMemoryColumnarStore::new();
        let id = RequestId::generate();
        let batch = vec![
            record(id, "rating", json!(true)),
            record(id, "property:topic", json!("billing")),
        ];

        store.upsert_feedback(&batch).await.unwrap();
        let first = store.feedback();
        store.upsert_feedback(&batch).await.unwrap();

        assert_eq!(store.feedback(), first);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_upsert_replaces_by_key() {
        let store = InMemoryColumnarStore::new();
        let id = RequestId::generate();

        store
            .upsert_feedback(&[record(id, "rating", json!(true))])
            .await
            .unwrap();
        store
            .upsert_feedback(&[record(id, "rating", json!(false))])
            .await
            .unwrap();

        let stored = store.feedback();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, json!(false));
    }

    #[tokio::test]
    async fn test_clickhouse_insert_uses_json_each_row_and_dedup_token() {
        let mut server = mockito::Server::new_async().await;
        let id = RequestId::generate();
        let batch = vec![record(id, "rating", json!(true))];

        let mock = server
            .mock("POST", "/")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded(
                    "query".into(),
                    "INSERT INTO analytics.feedback FORMAT JSONEachRow".into(),
                ),
                mockito::Matcher::Regex("insert_deduplication_token=[0-9a-f]{64}".into()),
            ]))
            .match_header("authorization", mockito::Matcher::Regex("^Basic ".into()))
            .match_body(mockito::Matcher::Regex(format!(
                r#""request_id":"{id}","feedback_key":"rating","value":"true""#
            )))
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let client = ClickHouseClient::new(reqwest::Client::new(), server.url(), settings());
        client.upsert_feedback(&batch).await.unwrap();
        client.upsert_feedback(&batch).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_clickhouse_rejection_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("Code: 60. DB::Exception: Table analytics.feedback does not exist")
            .create_async()
            .await;

        let client = ClickHouseClient::new(reqwest::Client::new(), server.url(), settings());
        let result = client
            .upsert_feedback(&[record(RequestId::generate(), "rating", json!(true))])
            .await;

        assert!(matches!(result, Err(StoreError::Rejected { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let client = ClickHouseClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            settings(),
        );
        assert!(client.upsert_feedback(&[]).await.is_ok());
    }
}
