use crate::domain::WorkerRole;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    pub upstream: UpstreamSettings,
    pub features: FeatureFlags,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingSettings,
    pub clickhouse: ClickHouseSettings,
    pub queue: QueueSettings,
    #[serde(default)]
    pub management: ManagementSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkerSettings {
    /// Static role override; when absent the role is derived from each
    /// request's host
    pub role: Option<WorkerRole>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamSettings {
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub azure_openai_base_url: Option<String>,
    pub custom_model_base_url: Option<String>,
    pub request_timeout_ms: u64,
    pub max_request_bytes: usize,
}

impl UpstreamSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FeatureFlags {
    pub cache_enabled: bool,
    pub vault_enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheSettings {
    pub ttl_seconds: u64,
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub default_quota: u64,
    pub default_window_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
    /// Base URL of the async log endpoint; delivery is skipped when unset
    pub base_url: Option<String>,
    /// Sent verbatim as the `Authorization` header of log deliveries
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSettings {
    /// HTTP interface, e.g. `http://localhost:8123`; an in-memory store is
    /// used when unset
    pub host: Option<String>,
    pub user: String,
    pub password: String,
    pub database: String,
    pub feedback_table: String,
    pub request_log_table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueSettings {
    pub feedback_queue_id: String,
    pub max_batch_size: usize,
    pub max_batch_wait_ms: u64,
    pub max_retries: u32,
}

impl QueueSettings {
    pub fn max_batch_wait(&self) -> Duration {
        Duration::from_millis(self.max_batch_wait_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ManagementSettings {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Self::with_defaults(Config::builder(), &environment)?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("management.api_keys")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Built-in defaults only, without files or environment
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::with_defaults(Config::builder(), "development")?
            .build()?
            .try_deserialize()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8787)?
            .set_default("application.environment", environment)?
            .set_default("upstream.openai_base_url", "https://api.openai.com")?
            .set_default("upstream.anthropic_base_url", "https://api.anthropic.com")?
            .set_default("upstream.request_timeout_ms", 120_000)?
            .set_default("upstream.max_request_bytes", 10 * 1024 * 1024)?
            .set_default("features.cache_enabled", false)?
            .set_default("features.vault_enabled", false)?
            .set_default("cache.ttl_seconds", 60 * 60 * 24 * 7)?
            .set_default("rate_limit.enabled", true)?
            .set_default("rate_limit.default_quota", 1000)?
            .set_default("rate_limit.default_window_seconds", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?
            .set_default("clickhouse.user", "default")?
            .set_default("clickhouse.password", "")?
            .set_default("clickhouse.database", "default")?
            .set_default("clickhouse.feedback_table", "feedback")?
            .set_default("clickhouse.request_log_table", "request_response_log")?
            .set_default("queue.feedback_queue_id", "feedback-insert-queue")?
            .set_default("queue.max_batch_size", 100)?
            .set_default("queue.max_batch_wait_ms", 1000)?
            .set_default("queue.max_retries", 3)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_can_be_loaded() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.application.port, 8787);
        assert!(settings.worker.role.is_none());
        assert!(!settings.features.cache_enabled);
        assert!(settings.logging.base_url.is_none());
        assert!(settings.clickhouse.host.is_none());
        assert_eq!(settings.queue.feedback_queue_id, "feedback-insert-queue");
        assert!(settings.management.api_keys.is_empty());
    }

    #[test]
    fn test_duration_helpers() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.upstream.request_timeout(), Duration::from_secs(120));
        assert_eq!(settings.queue.max_batch_wait(), Duration::from_secs(1));
        assert_eq!(settings.cache.ttl(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_bind_address_format() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.bind_address(), "0.0.0.0:8787");
    }
}
