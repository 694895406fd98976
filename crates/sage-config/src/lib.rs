//! Settings for the Sage completion core
//!
//! One TOML document describes which vendors are available (by credential),
//! the default provider and model, sampling defaults, per-provider fallback
//! alternatives, locally served models and log output.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod local;
pub mod logging;
mod vendor;

use indexmap::IndexMap;
use serde::Deserialize;

pub use llm::*;
pub use local::*;
pub use logging::*;
pub use vendor::Vendor;

/// Top-level settings object
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Preferred provider; ignored when that vendor is not configured
    #[serde(default)]
    pub default_provider: Option<Vendor>,
    /// Model used when a request names none
    #[serde(default)]
    pub default_model: Option<String>,
    /// Sampling defaults
    #[serde(default)]
    pub defaults: SamplingDefaults,
    /// Remote vendors keyed by tag
    #[serde(default)]
    pub providers: IndexMap<Vendor, ProviderSettings>,
    /// Locally served models
    #[serde(default)]
    pub local: Option<LocalSettings>,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Settings for a remote vendor, if present
    pub fn provider(&self, vendor: Vendor) -> Option<&ProviderSettings> {
        self.providers.get(&vendor)
    }
}
