//! Adapter registration from settings

use std::collections::BTreeMap;
use std::sync::Arc;

use sage_config::{Settings, Vendor};

use crate::error::LlmError;
use crate::fallback::FallbackPolicy;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::google::GoogleProvider;
use crate::provider::local::LocalProvider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::openrouter::OpenRouterProvider;
use crate::provider::{Provider, ProviderConfig};
use crate::resolve::RequestDefaults;

/// Registered adapters plus the policy needed to route between them
///
/// Built once from settings and never mutated; reconfiguring builds a new one.
pub struct Registry {
    adapters: BTreeMap<Vendor, Arc<dyn Provider>>,
    local: Option<Arc<LocalProvider>>,
    policies: BTreeMap<Vendor, FallbackPolicy>,
    defaults: RequestDefaults,
    default_provider: Option<Vendor>,
}

impl Registry {
    /// Register one adapter per configured vendor
    ///
    /// Remote vendors need an enabled section with a non-blank API key; the
    /// local vendor needs an enabled `[local]` section with at least one model.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if an adapter cannot be constructed
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let mut builder = Self::builder();

        for (&vendor, provider_settings) in &settings.providers {
            if !provider_settings.enabled {
                tracing::debug!(provider = %vendor, "provider disabled, skipping");
                continue;
            }
            if provider_settings.credential().is_none() {
                tracing::debug!(provider = %vendor, "no credential configured, skipping");
                continue;
            }

            let config = ProviderConfig::from_settings(vendor, provider_settings)?;
            let adapter: Arc<dyn Provider> = match vendor {
                Vendor::OpenAi => Arc::new(OpenAiProvider::new(config)?),
                Vendor::Anthropic => Arc::new(AnthropicProvider::new(config)?),
                Vendor::Google => Arc::new(GoogleProvider::new(config)?),
                Vendor::OpenRouter => Arc::new(OpenRouterProvider::new(config)?),
                Vendor::Local => {
                    tracing::warn!("local models belong under [local], ignoring provider entry");
                    continue;
                }
            };

            builder = builder.adapter(vendor, adapter).policy(
                vendor,
                FallbackPolicy::from_settings(provider_settings.default_model.clone(), &provider_settings.fallback),
            );
        }

        if let Some(ref local) = settings.local {
            if local.enabled && !local.models.is_empty() {
                builder = builder.local(Arc::new(LocalProvider::from_settings(local)?));
            } else {
                tracing::debug!("local models disabled or none configured, skipping");
            }
        }

        if let Some(preferred) = settings.default_provider {
            builder = builder.default_provider(preferred);
        }

        let registry = builder
            .defaults(RequestDefaults {
                model: settings.default_model.clone(),
                temperature: settings.defaults.temperature,
                max_tokens: settings.defaults.max_tokens,
                top_p: settings.defaults.top_p,
            })
            .build();

        for (vendor, adapter) in &registry.adapters {
            tracing::info!(provider = %vendor, endpoint = %adapter.describe().endpoint, "registered provider");
        }
        if let Some(default) = registry.default_provider {
            tracing::debug!(provider = %default, "default provider");
        }

        Ok(registry)
    }

    /// Start an empty registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Adapter for a vendor
    pub fn get(&self, vendor: Vendor) -> Option<Arc<dyn Provider>> {
        self.adapters.get(&vendor).cloned()
    }

    /// Whether an adapter is registered for the vendor
    pub fn is_registered(&self, vendor: Vendor) -> bool {
        self.adapters.contains_key(&vendor)
    }

    /// Registered vendors in tag order
    pub fn vendors(&self) -> impl Iterator<Item = Vendor> + '_ {
        self.adapters.keys().copied()
    }

    /// Registered adapters in tag order
    pub fn adapters(&self) -> impl Iterator<Item = (Vendor, &Arc<dyn Provider>)> {
        self.adapters.iter().map(|(v, a)| (*v, a))
    }

    /// The local adapter, when registered
    pub const fn local(&self) -> Option<&Arc<LocalProvider>> {
        self.local.as_ref()
    }

    /// Vendor used for models with no recognised prefix
    pub const fn default_provider(&self) -> Option<Vendor> {
        self.default_provider
    }

    /// Per-vendor fallback policies
    pub const fn policies(&self) -> &BTreeMap<Vendor, FallbackPolicy> {
        &self.policies
    }

    /// Request defaults
    pub const fn defaults(&self) -> &RequestDefaults {
        &self.defaults
    }

    /// Model used when `vendor` is reached without an explicit model
    pub fn default_model_for(&self, vendor: Vendor) -> Option<&str> {
        self.policies
            .get(&vendor)
            .and_then(|p| p.default_model.as_deref())
            .or_else(|| vendor.default_model())
    }
}

/// Incremental construction of a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    adapters: BTreeMap<Vendor, Arc<dyn Provider>>,
    local: Option<Arc<LocalProvider>>,
    policies: BTreeMap<Vendor, FallbackPolicy>,
    defaults: RequestDefaults,
    preferred: Option<Vendor>,
}

impl RegistryBuilder {
    /// Register an adapter
    #[must_use]
    pub fn adapter(mut self, vendor: Vendor, adapter: Arc<dyn Provider>) -> Self {
        self.adapters.insert(vendor, adapter);
        self
    }

    /// Register the local adapter
    #[must_use]
    pub fn local(mut self, local: Arc<LocalProvider>) -> Self {
        self.adapters.insert(Vendor::Local, Arc::clone(&local) as Arc<dyn Provider>);
        self.local = Some(local);
        self
    }

    /// Set a vendor's fallback policy
    #[must_use]
    pub fn policy(mut self, vendor: Vendor, policy: FallbackPolicy) -> Self {
        self.policies.insert(vendor, policy);
        self
    }

    /// Set request defaults
    #[must_use]
    pub fn defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Prefer a default provider; ignored if it ends up unregistered
    #[must_use]
    pub fn default_provider(mut self, vendor: Vendor) -> Self {
        self.preferred = Some(vendor);
        self
    }

    /// Finish, choosing the default provider
    pub fn build(self) -> Registry {
        let default_provider = self
            .preferred
            .filter(|v| self.adapters.contains_key(v))
            .or_else(|| {
                Vendor::PRIORITY
                    .into_iter()
                    .find(|v| self.adapters.contains_key(v))
            });

        Registry {
            adapters: self.adapters,
            local: self.local,
            policies: self.policies,
            defaults: self.defaults,
            default_provider,
        }
    }
}
