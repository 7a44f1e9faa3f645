//! Feedback queue consumer
//!
//! Flattens every message of a batch into feedback rows and applies them in a
//! single bulk upsert. Any store error retries the entire batch, so the
//! upsert must tolerate records that were already applied.

use crate::domain::{FeedbackQueueMessage, FeedbackRecord};
use crate::infrastructure::ColumnarStore;
use crate::queue::batch::{BatchDecision, MessageBatch};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct FeedbackQueueConsumer {
    store: Arc<dyn ColumnarStore>,
    queue_id: String,
}

impl FeedbackQueueConsumer {
    pub fn new(store: Arc<dyn ColumnarStore>, queue_id: impl Into<String>) -> Self {
        Self {
            store,
            queue_id: queue_id.into(),
        }
    }

    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    /// Queue names carry environment suffixes, so membership is by substring
    pub fn accepts(&self, queue: &str) -> bool {
        queue.contains(&self.queue_id)
    }

    pub async fn handle_batch(&self, batch: &MessageBatch<FeedbackQueueMessage>) -> BatchDecision {
        if !self.accepts(&batch.queue) {
            error!(
                queue = %batch.queue,
                batch_size = batch.len(),
                "Unknown queue, batch ignored"
            );
            return BatchDecision::Ignored;
        }

        let records: Vec<FeedbackRecord> = batch
            .messages
            .iter()
            .flat_map(|message| message.body.feedback.clone().into_records())
            .collect();

        if records.is_empty() {
            debug!(queue = %batch.queue, batch_size = batch.len(), "Batch carried no feedback fields");
            return BatchDecision::AckAll;
        }

        match self.store.upsert_feedback(&records).await {
            Ok(()) => {
                info!(
                    queue = %batch.queue,
                    batch_size = batch.len(),
                    rows = records.len(),
                    "Feedback batch stored"
                );
                BatchDecision::AckAll
            }
            Err(e) => {
                error!(
                    queue = %batch.queue,
                    batch_size = batch.len(),
                    error = %e,
                    "Feedback upsert failed, retrying batch"
                );
                BatchDecision::RetryAll
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedbackPayload, RequestId};
    use crate::infrastructure::{InMemoryColumnarStore, RequestLogRow, StoreError};
    use crate::queue::batch::QueueMessage;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct FailingStore;

    #[async_trait]
    impl ColumnarStore for FailingStore {
        async fn upsert_feedback(&self, _records: &[FeedbackRecord]) -> Result<(), StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }

        async fn insert_request_log(&self, _row: &RequestLogRow) -> Result<(), StoreError> {
            Err(StoreError::Transport("connection reset".to_string()))
        }
    }

    fn message(request_id: RequestId, rating: Option<bool>) -> QueueMessage<FeedbackQueueMessage> {
        let mut properties = BTreeMap::new();
        properties.insert("topic".to_string(), serde_json::json!("billing"));
        QueueMessage::new(FeedbackQueueMessage {
            feedback: FeedbackPayload {
                request_id,
                rating,
                properties,
                created_at: Utc::now(),
            },
        })
    }

    fn batch(queue: &str) -> MessageBatch<FeedbackQueueMessage> {
        MessageBatch::new(
            queue,
            vec![
                message(RequestId::generate(), Some(true)),
                message(RequestId::generate(), None),
            ],
        )
    }

    #[tokio::test]
    async fn test_successful_upsert_acks_all() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let consumer = FeedbackQueueConsumer::new(store.clone(), "feedback-insert-queue");

        let decision = consumer.handle_batch(&batch("feedback-insert-queue")).await;

        assert_eq!(decision, BatchDecision::AckAll);
        assert_eq!(store.feedback().len(), 3);
    }

    #[tokio::test]
    async fn test_store_error_retries_all() {
        let consumer = FeedbackQueueConsumer::new(Arc::new(FailingStore), "feedback-insert-queue");
        let decision = consumer.handle_batch(&batch("feedback-insert-queue")).await;
        assert_eq!(decision, BatchDecision::RetryAll);
    }

    #[tokio::test]
    async fn test_redelivered_batch_does_not_corrupt_state() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let consumer = FeedbackQueueConsumer::new(store.clone(), "feedback-insert-queue");
        let batch = batch("feedback-insert-queue");

        assert_eq!(consumer.handle_batch(&batch).await, BatchDecision::AckAll);
        let after_first = store.feedback();
        assert_eq!(consumer.handle_batch(&batch).await, BatchDecision::AckAll);

        assert_eq!(store.feedback(), after_first);
    }

    #[tokio::test]
    async fn test_queue_name_matches_by_substring() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let consumer = FeedbackQueueConsumer::new(store.clone(), "feedback-insert-queue");

        let decision = consumer
            .handle_batch(&batch("feedback-insert-queue-production"))
            .await;
        assert_eq!(decision, BatchDecision::AckAll);
    }

    #[tokio::test]
    async fn test_unknown_queue_is_ignored() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let consumer = FeedbackQueueConsumer::new(store.clone(), "feedback-insert-queue");

        let decision = consumer.handle_batch(&batch("request-insert-queue")).await;

        assert_eq!(decision, BatchDecision::Ignored);
        assert!(store.feedback().is_empty());
    }

    #[tokio::test]
    async fn test_batch_without_fields_is_acked() {
        let consumer = FeedbackQueueConsumer::new(Arc::new(FailingStore), "feedback-insert-queue");
        let empty = MessageBatch::new(
            "feedback-insert-queue",
            vec![QueueMessage::new(FeedbackQueueMessage {
                feedback: FeedbackPayload {
                    request_id: RequestId::generate(),
                    rating: None,
                    properties: BTreeMap::new(),
                    created_at: Utc::now(),
                },
            })],
        );

        assert_eq!(consumer.handle_batch(&empty).await, BatchDecision::AckAll);
    }
}
