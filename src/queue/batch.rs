//! Queue message and batch envelopes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One durable message as delivered to a consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage<T> {
    pub id: Uuid,
    pub body: T,
    /// Deliveries that ended in a retry so far
    pub attempts: u32,
}

impl<T> QueueMessage<T> {
    pub fn new(body: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            body,
            attempts: 0,
        }
    }
}

/// Messages delivered together from one queue
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBatch<T> {
    pub queue: String,
    pub messages: Vec<QueueMessage<T>>,
}

impl<T> MessageBatch<T> {
    pub fn new(queue: impl Into<String>, messages: Vec<QueueMessage<T>>) -> Self {
        Self {
            queue: queue.into(),
            messages,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Consumer verdict for a whole batch; partial success is not representable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDecision {
    AckAll,
    RetryAll,
    /// Not ours: neither acked nor retried, left to queue expiry
    Ignored,
}
