//! Provider adapter table
//!
//! Stateless mapping from a provider to where its traffic goes: the upstream
//! API base for proxied calls and the log ingestion endpoint for recorded
//! exchanges. Every arm is explicit; `Provider::Unknown` is rejected, never
//! routed.

use crate::config::UpstreamSettings;
use crate::domain::{Provider, UnsupportedProvider};
use crate::proxy::headers::paths;
use crate::proxy::types::{ProxyError, ProxyResult, TargetUrl};
use http::Uri;

/// Log ingestion URL for `provider` under `base_path`.
///
/// Custom models replace the path of `base_path` (scheme and authority are
/// kept); every other known provider appends its suffix.
pub fn log_endpoint(provider: Provider, base_path: &str) -> Result<String, UnsupportedProvider> {
    match provider {
        Provider::CustomModel => replace_path(base_path, paths::CUSTOM_LOG),
        Provider::OpenAI | Provider::AzureOpenAI => Ok(append_path(base_path, paths::OPENAI_LOG)),
        Provider::Anthropic => Ok(append_path(base_path, paths::ANTHROPIC_LOG)),
        Provider::Unknown => Err(UnsupportedProvider(provider.to_string())),
    }
}

/// Upstream API base a proxied request is forwarded to.
///
/// `target_url` is the caller's `relay-target-url` header; it is only
/// consulted for providers without a fixed public endpoint.
pub fn upstream_base(
    provider: Provider,
    upstream: &UpstreamSettings,
    target_url: Option<&str>,
) -> ProxyResult<TargetUrl> {
    let base = match provider {
        Provider::OpenAI => Some(upstream.openai_base_url.as_str()),
        Provider::Anthropic => Some(upstream.anthropic_base_url.as_str()),
        Provider::AzureOpenAI => target_url.or(upstream.azure_openai_base_url.as_deref()),
        Provider::CustomModel => target_url.or(upstream.custom_model_base_url.as_deref()),
        Provider::Unknown => {
            return Err(UnsupportedProvider(provider.to_string()).into());
        }
    };

    let base = base.ok_or_else(|| {
        ProxyError::InvalidTargetUrl(format!("No upstream configured for provider {provider}"))
    })?;

    TargetUrl::try_new(base.to_string())
        .map_err(|e| ProxyError::InvalidTargetUrl(format!("Invalid target URL '{base}': {e}")))
}

fn append_path(base_path: &str, suffix: &str) -> String {
    format!("{}{suffix}", base_path.trim_end_matches('/'))
}

fn replace_path(base_path: &str, path: &str) -> Result<String, UnsupportedProvider> {
    let uri: Uri = base_path
        .parse()
        .map_err(|_| UnsupportedProvider(format!("custom-model (invalid base '{base_path}')")))?;

    match (uri.scheme_str(), uri.authority()) {
        (Some(scheme), Some(authority)) => Ok(format!("{scheme}://{authority}{path}")),
        _ => Err(UnsupportedProvider(format!(
            "custom-model (base '{base_path}' has no scheme or host)"
        ))),
    }
}
