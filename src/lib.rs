//! llm_relay - an edge gateway for LLM provider calls
//!
//! Requests are classified into a worker role by host, proxied to the
//! provider (with optional caching, rate limiting and key vaulting), and
//! every exchange is recorded asynchronously off the response path.
//! Feedback submitted through the management API is batched into a
//! columnar store by a queue consumer.

pub mod application;
pub mod async_log;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod kv;
pub mod proxy;
pub mod queue;

pub use application::Application;
pub use error::{Error, Result};
