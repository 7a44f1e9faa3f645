//! Worker-role classification
//!
//! A gateway instance runs one of a fixed set of pipelines. The role is either
//! configured statically or derived from the host the request was addressed
//! to. Derivation is a pure function of its inputs and is evaluated once per
//! request; nothing is written back to shared configuration.

use crate::domain::provider::Provider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which request-handling pipeline an instance runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerRole {
    #[serde(rename = "OPENAI_PROXY")]
    OpenAiProxy,
    #[serde(rename = "ANTHROPIC_PROXY")]
    AnthropicProxy,
    #[serde(rename = "API")]
    ManagementApi,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAiProxy => "OPENAI_PROXY",
            Self::AnthropicProxy => "ANTHROPIC_PROXY",
            Self::ManagementApi => "API",
        }
    }

    /// Provider implied by a proxy role, `None` for the management API
    pub fn default_provider(&self) -> Option<Provider> {
        match self {
            Self::OpenAiProxy => Some(Provider::OpenAI),
            Self::AnthropicProxy => Some(Provider::Anthropic),
            Self::ManagementApi => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        !matches!(self, Self::ManagementApi)
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerRole {
    type Err = ClassificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPENAI_PROXY" => Ok(Self::OpenAiProxy),
            "ANTHROPIC_PROXY" => Ok(Self::AnthropicProxy),
            "API" | "MANAGEMENT_API" => Ok(Self::ManagementApi),
            other => Err(ClassificationError::UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("Could not determine worker type from host '{0}'")]
    UnclassifiableHost(String),

    #[error("Unknown worker role '{0}'")]
    UnknownRole(String),
}

/// Resolve the worker role for a request.
///
/// A static override wins unchanged. Otherwise the first label of a host with
/// at least three labels decides: `oai` before `anthropic` before `api`.
pub fn classify(
    host: &str,
    static_override: Option<WorkerRole>,
) -> Result<WorkerRole, ClassificationError> {
    if let Some(role) = static_override {
        return Ok(role);
    }

    let hostname = host.split(':').next().unwrap_or_default();
    let labels: Vec<&str> = hostname.split('.').collect();
    if labels.len() < 3 {
        return Err(ClassificationError::UnclassifiableHost(host.to_string()));
    }

    let first = labels[0].to_ascii_lowercase();
    if first.contains("oai") {
        Ok(WorkerRole::OpenAiProxy)
    } else if first.contains("anthropic") {
        Ok(WorkerRole::AnthropicProxy)
    } else if first.contains("api") {
        Ok(WorkerRole::ManagementApi)
    } else {
        Err(ClassificationError::UnclassifiableHost(host.to_string()))
    }
}
