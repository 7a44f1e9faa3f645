//! Upstream LLM provider classification

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Logical upstream provider a request is bound to.
///
/// `Unknown` is a real classification: the request could not be mapped to
/// any provider. Proxy pipelines reject it, they never fall back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "azure-openai")]
    AzureOpenAI,
    Anthropic,
    CustomModel,
    Unknown,
}

impl Provider {
    pub const OPENAI: &'static str = "openai";
    pub const AZURE_OPENAI: &'static str = "azure-openai";
    pub const ANTHROPIC: &'static str = "anthropic";
    pub const CUSTOM_MODEL: &'static str = "custom-model";
    pub const UNKNOWN: &'static str = "unknown";

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => Self::OPENAI,
            Self::AzureOpenAI => Self::AZURE_OPENAI,
            Self::Anthropic => Self::ANTHROPIC,
            Self::CustomModel => Self::CUSTOM_MODEL,
            Self::Unknown => Self::UNKNOWN,
        }
    }

    /// Parse a provider name, mapping anything unrecognised to `Unknown`
    pub fn classify(name: &str) -> Self {
        name.parse().unwrap_or(Self::Unknown)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised whenever a stage needs a concrete provider and gets something else
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Provider not supported: {0}")]
pub struct UnsupportedProvider(pub String);

impl FromStr for Provider {
    type Err = UnsupportedProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            Self::OPENAI | "oai" => Ok(Self::OpenAI),
            Self::AZURE_OPENAI | "azure" => Ok(Self::AzureOpenAI),
            Self::ANTHROPIC => Ok(Self::Anthropic),
            Self::CUSTOM_MODEL | "custom" => Ok(Self::CustomModel),
            other => Err(UnsupportedProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("openai", Provider::OpenAI)]
    #[case("OpenAI", Provider::OpenAI)]
    #[case("azure-openai", Provider::AzureOpenAI)]
    #[case("anthropic", Provider::Anthropic)]
    #[case(" custom-model ", Provider::CustomModel)]
    #[case("custom", Provider::CustomModel)]
    #[case("bedrock", Provider::Unknown)]
    #[case("", Provider::Unknown)]
    fn classifies_provider_names(#[case] input: &str, #[case] expected: Provider) {
        assert_eq!(Provider::classify(input), expected);
    }

    #[test]
    fn unknown_is_not_parseable() {
        assert!("unknown".parse::<Provider>().is_err());
        assert!(!Provider::Unknown.is_known());
    }

    #[test]
    fn serializes_as_wire_names() {
        assert_eq!(
            serde_json::to_string(&Provider::AzureOpenAI).unwrap(),
            "\"azure-openai\""
        );
        assert_eq!(
            serde_json::to_string(&Provider::OpenAI).unwrap(),
            "\"openai\""
        );
        assert_eq!(
            serde_json::to_string(&Provider::CustomModel).unwrap(),
            "\"custom-model\""
        );
    }
}
