//! Asynchronous delivery of captured exchanges to the log endpoint
//!
//! Delivery is best effort and at most once: each record is posted once from
//! a detached task, failures are reported through the outcome and the
//! optional hook, and nothing is retried. Completion order relative to other
//! requests is unspecified.

use crate::config::LoggingSettings;
use crate::domain::{AsyncLogRequest, Provider, UnsupportedProvider};
use crate::proxy::provider_table::log_endpoint;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Observation callback run once per delivery attempt
pub type LogHook = Arc<dyn Fn(&LogResult) -> anyhow::Result<()> + Send + Sync>;

/// What the log endpoint answered, or a synthesized 500 when it could not be
/// reached
#[derive(Debug, Clone, PartialEq)]
pub struct LogResult {
    pub status: u16,
    pub body: Value,
    /// `true` when no HTTP response was received
    pub synthesized: bool,
}

impl LogResult {
    fn synthesized_failure() -> Self {
        Self {
            status: 500,
            body: Value::Null,
            synthesized: true,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("Logging base URL is not configured")]
    BaseUrlUnconfigured,

    #[error(transparent)]
    UnsupportedProvider(#[from] UnsupportedProvider),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogOutcome {
    Completed(LogResult),
    Skipped(SkipReason),
}

impl LogOutcome {
    pub fn result(&self) -> Option<&LogResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Skipped(_) => None,
        }
    }
}

/// Destination for captured exchanges
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn log(&self, record: AsyncLogRequest, provider: Provider) -> LogOutcome;
}

/// Posts records to `{logging.base_url}` + the provider's log path
#[derive(Clone)]
pub struct AsyncLogger {
    client: reqwest::Client,
    base_url: Option<String>,
    auth_header: Option<String>,
    hook: Option<LogHook>,
}

impl AsyncLogger {
    pub fn new(client: reqwest::Client, settings: &LoggingSettings) -> Self {
        Self {
            client,
            base_url: settings
                .base_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            auth_header: settings
                .auth_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: LogHook) -> Self {
        self.hook = Some(hook);
        self
    }

    async fn deliver(&self, url: &str, record: &AsyncLogRequest) -> LogResult {
        let mut request = self.client.post(url).json(record);
        if let Some(auth) = &self.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(url, error = %e, "Error making request to log endpoint");
                return LogResult::synthesized_failure();
            }
        };

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) => crate::domain::log_record::body_as_json(&bytes),
            Err(e) => {
                warn!(url, status, error = %e, "Log endpoint response body unreadable");
                Value::Null
            }
        };

        if !(200..300).contains(&status) {
            warn!(url, status, "Log endpoint rejected record");
        }

        LogResult {
            status,
            body,
            synthesized: false,
        }
    }

    /// Hook errors are logged and dropped. A panicking hook is not caught.
    fn observe(&self, result: &LogResult) {
        let Some(hook) = &self.hook else {
            return;
        };

        if let Err(e) = hook(result) {
            warn!(error = %e, "Log hook failed");
        }
    }
}

#[async_trait]
impl LogSink for AsyncLogger {
    async fn log(&self, record: AsyncLogRequest, provider: Provider) -> LogOutcome {
        let Some(base_url) = &self.base_url else {
            error!("Failed to log exchange: base URL is undefined");
            return LogOutcome::Skipped(SkipReason::BaseUrlUnconfigured);
        };

        let url = match log_endpoint(provider, base_url) {
            Ok(url) => url,
            Err(e) => {
                error!(%provider, error = %e, "Failed to log exchange");
                return LogOutcome::Skipped(e.into());
            }
        };

        let result = self.deliver(&url, &record).await;
        debug!(%provider, status = result.status, "Log delivery finished");
        self.observe(&result);
        LogOutcome::Completed(result)
    }
}

/// Runs log deliveries as detached tasks off the response path
#[derive(Clone)]
pub struct LogDispatcher {
    sink: Arc<dyn LogSink>,
}

impl LogDispatcher {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    /// Schedule delivery and return immediately.
    ///
    /// Dropping the handle detaches the task; it is not awaited on shutdown.
    pub fn dispatch(&self, record: AsyncLogRequest, provider: Provider) -> JoinHandle<LogOutcome> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move { sink.log(record, provider).await })
    }
}
