//! Process-wide gateway environment
//!
//! Built once at startup and shared read-only by every request. Nothing in
//! here is mutated after construction; per-request state lives in the
//! `RequestWrapper`.

use crate::async_log::{AsyncLogger, LogDispatcher, LogSink};
use crate::config::Settings;
use crate::domain::FeedbackQueueMessage;
use crate::error::{Error, Result};
use crate::infrastructure::{ClickHouseClient, ColumnarStore, InMemoryColumnarStore};
use crate::kv::{InMemoryKvStore, KvStore};
use crate::proxy::{
    AuthConfig, Forwarder, ManagementPipeline, PipelineSet, ProviderKeyVault, ProxyPipeline,
    RateLimiter, ResponseCache, UpstreamForwarder,
};
use crate::queue::{FeedbackQueue, FeedbackQueueConsumer, QueueMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// One handle per KV namespace
#[derive(Clone)]
pub struct KvNamespaces {
    pub rate_limit: Arc<dyn KvStore>,
    pub cache: Arc<dyn KvStore>,
    pub vault: Arc<dyn KvStore>,
}

impl KvNamespaces {
    pub fn in_memory() -> Self {
        Self {
            rate_limit: Arc::new(InMemoryKvStore::new()),
            cache: Arc::new(InMemoryKvStore::new()),
            vault: Arc::new(InMemoryKvStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct GatewayEnv {
    pub settings: Arc<Settings>,
    pub kv: KvNamespaces,
    pub store: Arc<dyn ColumnarStore>,
    /// Set when `store` is ClickHouse, for schema management
    pub clickhouse: Option<ClickHouseClient>,
    pub log_sink: Arc<dyn LogSink>,
    pub forwarder: Arc<dyn Forwarder>,
    pub feedback: FeedbackQueue,
}

impl GatewayEnv {
    /// Assemble the production environment from settings.
    ///
    /// Returns the receiving end of the feedback queue for the worker.
    pub fn from_settings(
        settings: Settings,
    ) -> Result<(Self, mpsc::Receiver<QueueMessage<FeedbackQueueMessage>>)> {
        let settings = Arc::new(settings);
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::application(format!("Failed to build HTTP client: {e}")))?;

        let clickhouse = settings
            .clickhouse
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .map(|host| ClickHouseClient::new(client.clone(), host, settings.clickhouse.clone()));

        let store: Arc<dyn ColumnarStore> = match &clickhouse {
            Some(clickhouse) => {
                info!(database = %settings.clickhouse.database, "Using ClickHouse store");
                Arc::new(clickhouse.clone())
            }
            None => {
                info!("No ClickHouse host configured, using in-memory store");
                Arc::new(InMemoryColumnarStore::new())
            }
        };

        let forwarder: Arc<dyn Forwarder> = Arc::new(UpstreamForwarder::with_client(
            client.clone(),
            settings.upstream.request_timeout(),
        ));
        let log_sink: Arc<dyn LogSink> = Arc::new(AsyncLogger::new(client, &settings.logging));
        let (feedback, receiver) = FeedbackQueue::new(settings.queue.feedback_queue_id.clone());

        let env = Self {
            settings,
            kv: KvNamespaces::in_memory(),
            store,
            clickhouse,
            log_sink,
            forwarder,
            feedback,
        };
        Ok((env, receiver))
    }

    /// Pipelines for every role, sharing this environment's handles
    pub fn pipelines(&self) -> Result<PipelineSet> {
        let mut proxy = ProxyPipeline::new(
            self.settings.clone(),
            self.forwarder.clone(),
            LogDispatcher::new(self.log_sink.clone()),
        )
        .with_cache(ResponseCache::new(
            self.kv.cache.clone(),
            self.settings.cache.ttl(),
        ))
        .with_vault(ProviderKeyVault::new(self.kv.vault.clone()));

        if self.settings.rate_limit.enabled {
            let limiter = RateLimiter::new(self.kv.rate_limit.clone(), &self.settings.rate_limit)
                .map_err(|e| Error::InvalidSettings(format!("rate_limit: {e}")))?;
            proxy = proxy.with_rate_limiter(limiter);
        }

        let management = ManagementPipeline::new(
            AuthConfig::from_keys(self.settings.management.api_keys.iter().cloned()),
            self.store.clone(),
            self.feedback.clone(),
        );

        Ok(PipelineSet::new(Arc::new(proxy), Arc::new(management)))
    }

    pub fn feedback_consumer(&self) -> FeedbackQueueConsumer {
        FeedbackQueueConsumer::new(self.store.clone(), self.settings.queue.feedback_queue_id.clone())
    }
}
