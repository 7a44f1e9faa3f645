//! Durable-queue consumption with batch-level ack/retry

pub mod batch;
pub mod feedback_consumer;
pub mod worker;

pub use batch::{BatchDecision, MessageBatch, QueueMessage};
pub use feedback_consumer::FeedbackQueueConsumer;
pub use worker::{FeedbackQueue, QueueError, QueueWorker, WorkerStats};
