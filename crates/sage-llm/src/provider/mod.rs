//! Provider trait and vendor adapters

pub mod anthropic;
pub mod google;
pub(crate) mod http;
pub mod local;
pub mod openai;
pub mod openrouter;

use std::time::Duration;

use async_trait::async_trait;
use sage_config::{ProviderSettings, Vendor};
use secrecy::SecretString;
use url::Url;

use crate::error::LlmError;
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse};

/// Static description of an adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    /// Vendor tag
    pub vendor: Vendor,
    /// Human-readable name
    pub display_name: String,
    /// Base endpoint requests are sent to
    pub endpoint: Url,
}

/// Trait implemented by each vendor adapter
#[async_trait]
pub trait Provider: Send + Sync {
    /// Vendor tag, display name and endpoint
    fn describe(&self) -> ProviderInfo;

    /// Send a non-streaming completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Send a streaming completion request
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError>;

    /// Models this vendor offers, filtered to its own family and the allow-list
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    /// Whether the configured credential is accepted
    async fn validate_credential(&self) -> bool {
        self.list_models().await.is_ok()
    }
}

/// Connection settings shared by the remote adapters
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Vendor tag
    pub vendor: Vendor,
    /// Human-readable name
    pub display_name: String,
    /// Base URL without a trailing path separator
    pub base_url: Url,
    /// API key
    pub api_key: Option<SecretString>,
    /// Allow-list applied to model listings; empty means no filter
    pub models: Vec<String>,
    /// Per-request timeout for non-streaming calls
    pub timeout: Option<Duration>,
}

impl ProviderConfig {
    /// Config pointing at the vendor's public endpoint
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the built-in endpoint does not parse
    pub fn new(vendor: Vendor, api_key: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            vendor,
            display_name: vendor.display_name().to_owned(),
            base_url: default_base_url(vendor)?,
            api_key: Some(SecretString::from(api_key.into())),
            models: Vec::new(),
            timeout: None,
        })
    }

    /// Build from the vendor's settings section
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the endpoint or timeout is invalid
    pub fn from_settings(vendor: Vendor, settings: &ProviderSettings) -> Result<Self, LlmError> {
        let base_url = match settings.base_url {
            Some(ref url) => url.clone(),
            None => default_base_url(vendor)?,
        };

        Ok(Self {
            vendor,
            display_name: settings
                .display_name
                .clone()
                .unwrap_or_else(|| vendor.display_name().to_owned()),
            base_url,
            api_key: settings.credential().cloned(),
            models: settings.models.clone(),
            timeout: settings.timeout()?,
        })
    }

    /// Replace the endpoint
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Absolute URL for an API path such as `/chat/completions`
    pub(crate) fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}{path}")
    }

    /// Apply the configured allow-list to a model listing
    pub(crate) fn allowed(&self, models: Vec<String>) -> Vec<String> {
        if self.models.is_empty() {
            return models;
        }
        models.into_iter().filter(|m| self.models.contains(m)).collect()
    }

    pub(crate) fn info(&self) -> ProviderInfo {
        ProviderInfo {
            vendor: self.vendor,
            display_name: self.display_name.clone(),
            endpoint: self.base_url.clone(),
        }
    }
}

/// Parse the built-in endpoint for a vendor
pub(crate) fn default_base_url(vendor: Vendor) -> Result<Url, LlmError> {
    Url::parse(vendor.default_base_url())
        .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid default endpoint for {vendor}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ProviderConfig::new(Vendor::OpenAi, "k")
            .unwrap()
            .with_base_url(Url::parse("http://127.0.0.1:9000/v1/").unwrap());
        assert_eq!(config.endpoint("/models"), "http://127.0.0.1:9000/v1/models");
    }

    #[test]
    fn allow_list_filters_listing() {
        let mut config = ProviderConfig::new(Vendor::OpenAi, "k").unwrap();
        let listing = vec!["gpt-4o".to_owned(), "gpt-4o-mini".to_owned()];
        assert_eq!(config.allowed(listing.clone()).len(), 2);

        config.models = vec!["gpt-4o".to_owned()];
        assert_eq!(config.allowed(listing), vec!["gpt-4o".to_owned()]);
    }

    #[test]
    fn settings_override_name_and_endpoint() {
        let mut settings = ProviderSettings::with_api_key("k");
        settings.display_name = Some("Work OpenAI".to_owned());
        settings.base_url = Some(Url::parse("https://proxy.example/v1").unwrap());
        settings.timeout = Some("30s".to_owned());

        let config = ProviderConfig::from_settings(Vendor::OpenAi, &settings).unwrap();
        assert_eq!(config.display_name, "Work OpenAI");
        assert_eq!(config.base_url.host_str(), Some("proxy.example"));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    }
}
