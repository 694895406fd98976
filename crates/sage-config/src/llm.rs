use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::Vendor;

/// Sampling parameters applied when a request leaves them unset
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingDefaults {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Maximum output tokens
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold
    #[serde(default)]
    pub top_p: Option<f64>,
}

/// Configuration for one remote vendor
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    /// API key; a missing or blank key leaves the vendor unregistered
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Set to false to keep the section without registering the vendor
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Display name override
    #[serde(default)]
    pub display_name: Option<String>,
    /// Model used when this vendor is reached without an explicit model
    #[serde(default)]
    pub default_model: Option<String>,
    /// Static allow-list applied to model listings
    #[serde(default)]
    pub models: Vec<String>,
    /// Per-request timeout (e.g. "60s", "2m")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Fallback models and providers tried after this one fails
    #[serde(default)]
    pub fallback: FallbackSettings,
}

/// Ordered fallback alternatives for a provider
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FallbackSettings {
    /// First alternative model on the same provider
    #[serde(default)]
    pub secondary_model: Option<String>,
    /// Second alternative model on the same provider
    #[serde(default)]
    pub tertiary_model: Option<String>,
    /// First alternative provider
    #[serde(default)]
    pub secondary_provider: Option<Vendor>,
    /// Second alternative provider
    #[serde(default)]
    pub tertiary_provider: Option<Vendor>,
}

impl ProviderSettings {
    /// Settings holding only an API key, everything else defaulted
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            base_url: None,
            enabled: true,
            display_name: None,
            default_model: None,
            models: Vec::new(),
            timeout: None,
            fallback: FallbackSettings::default(),
        }
    }

    /// The API key, if one is present and not blank
    pub fn credential(&self) -> Option<&SecretString> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
    }

    /// Parsed request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout string is not a valid duration
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        parse_timeout(self.timeout.as_deref())
    }
}

/// Parse an optional human-readable duration such as `"45s"`
pub(crate) fn parse_timeout(raw: Option<&str>) -> anyhow::Result<Option<Duration>> {
    raw.map(|s| duration_str::parse(s).map_err(|e| anyhow::anyhow!("invalid duration '{s}': {e}")))
        .transpose()
}

#[allow(clippy::missing_const_for_fn)]
pub(crate) fn default_enabled() -> bool {
    true
}
