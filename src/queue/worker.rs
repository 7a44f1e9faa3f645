//! In-process queue runtime
//!
//! `FeedbackQueue` is the producer handle given to the management API;
//! `QueueWorker` drains it in batches bounded by size and wait time, hands
//! each batch to the consumer and applies the verdict to every message.

use crate::config::QueueSettings;
use crate::domain::FeedbackQueueMessage;
use crate::queue::batch::{BatchDecision, MessageBatch, QueueMessage};
use crate::queue::feedback_consumer::FeedbackQueueConsumer;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Producer buffer; senders wait when it is full
const QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue '{0}' is closed")]
    Closed(String),
}

type Envelope = QueueMessage<FeedbackQueueMessage>;

#[derive(Debug, Clone)]
pub struct FeedbackQueue {
    name: String,
    sender: mpsc::Sender<Envelope>,
}

impl FeedbackQueue {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::Receiver<Envelope>) {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn send(&self, message: FeedbackQueueMessage) -> Result<(), QueueError> {
        self.sender
            .send(QueueMessage::new(message))
            .await
            .map_err(|_| QueueError::Closed(self.name.clone()))
    }
}

/// Per-message tallies over a worker's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub acked: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub ignored: usize,
}

pub struct QueueWorker {
    queue: String,
    consumer: FeedbackQueueConsumer,
    receiver: mpsc::Receiver<Envelope>,
    shutdown_rx: mpsc::Receiver<()>,
    max_batch_size: usize,
    max_batch_wait: Duration,
    max_retries: u32,
}

impl QueueWorker {
    pub fn new(
        queue: impl Into<String>,
        consumer: FeedbackQueueConsumer,
        receiver: mpsc::Receiver<Envelope>,
        settings: &QueueSettings,
    ) -> (Self, mpsc::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = Self {
            queue: queue.into(),
            consumer,
            receiver,
            shutdown_rx,
            max_batch_size: settings.max_batch_size.max(1),
            max_batch_wait: settings.max_batch_wait(),
            max_retries: settings.max_retries,
        };

        (worker, shutdown_tx)
    }

    /// Run until shutdown is signalled or every producer is gone, then
    /// drain what is still buffered (redeliveries stay bounded by
    /// `max_retries`)
    pub async fn run(mut self) -> WorkerStats {
        info!(queue = %self.queue, "Queue worker started");

        let mut stats = WorkerStats::default();
        let mut pending: Vec<Envelope> = Vec::new();
        let mut stopping = false;

        loop {
            if stopping {
                while let Ok(message) = self.receiver.try_recv() {
                    pending.push(message);
                }
            } else {
                stopping = self.fill(&mut pending).await;
            }

            if pending.is_empty() {
                if stopping {
                    break;
                }
                continue;
            }

            let take = pending.len().min(self.max_batch_size);
            let batch = MessageBatch::new(self.queue.clone(), pending.drain(..take).collect());
            let decision = self.consumer.handle_batch(&batch).await;
            self.settle(batch, decision, &mut pending, &mut stats);
        }

        info!(
            queue = %self.queue,
            acked = stats.acked,
            retried = stats.retried,
            dead_lettered = stats.dead_lettered,
            ignored = stats.ignored,
            "Queue worker stopped"
        );
        stats
    }

    /// Collect messages until the batch is full or the wait elapses.
    /// Returns `true` once the worker should stop.
    async fn fill(&mut self, pending: &mut Vec<Envelope>) -> bool {
        if pending.is_empty() {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return true,
                message = self.receiver.recv() => match message {
                    Some(message) => pending.push(message),
                    None => return true,
                },
            }
        }

        let deadline = Instant::now() + self.max_batch_wait;
        while pending.len() < self.max_batch_size {
            tokio::select! {
                _ = self.shutdown_rx.recv() => return true,
                _ = tokio::time::sleep_until(deadline) => break,
                message = self.receiver.recv() => match message {
                    Some(message) => pending.push(message),
                    None => return true,
                },
            }
        }

        false
    }

    fn settle(
        &self,
        batch: MessageBatch<FeedbackQueueMessage>,
        decision: BatchDecision,
        pending: &mut Vec<Envelope>,
        stats: &mut WorkerStats,
    ) {
        let size = batch.len();
        match decision {
            BatchDecision::AckAll => {
                debug!(queue = %self.queue, batch_size = size, "Batch acknowledged");
                stats.acked += size;
            }
            BatchDecision::Ignored => {
                error!(queue = %self.queue, batch_size = size, "Batch ignored, messages dropped");
                stats.ignored += size;
            }
            BatchDecision::RetryAll => {
                let mut redeliver = Vec::with_capacity(size);
                for mut message in batch.messages {
                    message.attempts += 1;
                    if message.attempts > self.max_retries {
                        error!(
                            queue = %self.queue,
                            message_id = %message.id,
                            attempts = message.attempts,
                            request_id = %message.body.feedback.request_id,
                            "Message dead-lettered"
                        );
                        stats.dead_lettered += 1;
                    } else {
                        redeliver.push(message);
                    }
                }

                if !redeliver.is_empty() {
                    warn!(queue = %self.queue, batch_size = redeliver.len(), "Batch scheduled for redelivery");
                    stats.retried += redeliver.len();
                    pending.splice(0..0, redeliver);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FeedbackPayload, FeedbackRecord, RequestId};
    use crate::infrastructure::{ColumnarStore, InMemoryColumnarStore, RequestLogRow, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails the first `failures` upserts, then delegates
    struct FlakyStore {
        failures: AtomicUsize,
        inner: InMemoryColumnarStore,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                inner: InMemoryColumnarStore::new(),
            }
        }
    }

    #[async_trait]
    impl ColumnarStore for FlakyStore {
        async fn upsert_feedback(&self, records: &[FeedbackRecord]) -> Result<(), StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Transport("unavailable".to_string()));
            }
            self.inner.upsert_feedback(records).await
        }

        async fn insert_request_log(&self, row: &RequestLogRow) -> Result<(), StoreError> {
            self.inner.insert_request_log(row).await
        }
    }

    fn settings(max_batch_size: usize, max_retries: u32) -> QueueSettings {
        QueueSettings {
            feedback_queue_id: "feedback-insert-queue".to_string(),
            max_batch_size,
            max_batch_wait_ms: 50,
            max_retries,
        }
    }

    fn feedback() -> FeedbackQueueMessage {
        FeedbackQueueMessage {
            feedback: FeedbackPayload {
                request_id: RequestId::generate(),
                rating: Some(true),
                properties: Default::default(),
                created_at: Utc::now(),
            },
        }
    }

    async fn run_with(
        store: Arc<dyn ColumnarStore>,
        queue_name: &str,
        settings: QueueSettings,
        messages: usize,
    ) -> WorkerStats {
        let (queue, receiver) = FeedbackQueue::new(queue_name);
        let consumer = FeedbackQueueConsumer::new(store, settings.feedback_queue_id.clone());
        let (worker, _shutdown) = QueueWorker::new(queue_name, consumer, receiver, &settings);
        let handle = tokio::spawn(worker.run());

        for _ in 0..messages {
            queue.send(feedback()).await.unwrap();
        }
        drop(queue);

        handle.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_are_acked_in_batches() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let stats = run_with(store.clone(), "feedback-insert-queue", settings(2, 3), 5).await;

        assert_eq!(stats.acked, 5);
        assert_eq!(store.feedback().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_is_redelivered_until_stored() {
        let store = Arc::new(FlakyStore::new(2));
        let stats = run_with(store.clone(), "feedback-insert-queue", settings(10, 3), 3).await;

        assert_eq!(stats.acked, 3);
        assert_eq!(stats.retried, 6);
        assert_eq!(stats.dead_lettered, 0);
        assert_eq!(store.inner.feedback().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_past_max_retries_are_dead_lettered() {
        let store = Arc::new(FlakyStore::new(usize::MAX));
        let stats = run_with(store, "feedback-insert-queue", settings(10, 1), 2).await;

        assert_eq!(stats.acked, 0);
        assert_eq!(stats.dead_lettered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_queue_batches_are_dropped() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let stats = run_with(store.clone(), "request-insert-queue", settings(10, 3), 2).await;

        assert_eq!(stats.ignored, 2);
        assert!(store.feedback().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_buffered_messages() {
        let store = Arc::new(InMemoryColumnarStore::new());
        let settings = settings(100, 3);
        let (queue, receiver) = FeedbackQueue::new("feedback-insert-queue");
        let consumer = FeedbackQueueConsumer::new(store.clone(), "feedback-insert-queue");
        let (worker, shutdown) =
            QueueWorker::new("feedback-insert-queue", consumer, receiver, &settings);

        queue.send(feedback()).await.unwrap();
        queue.send(feedback()).await.unwrap();
        shutdown.send(()).await.unwrap();

        let stats = worker.run().await;
        assert_eq!(stats.acked, 2);
        assert_eq!(store.feedback().len(), 2);
    }
}
