//! Ordered fallback chain construction

use std::collections::BTreeMap;

use sage_config::{FallbackSettings, Vendor};

/// One (provider, model) attempt in a fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Vendor to send the request to
    pub provider: Vendor,
    /// Model to request
    pub model: String,
}

impl Candidate {
    /// Create a candidate
    pub fn new(provider: Vendor, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Per-provider fallback alternatives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackPolicy {
    /// Model used when this provider is reached as an alternative
    pub default_model: Option<String>,
    /// First alternative model on this provider
    pub secondary_model: Option<String>,
    /// Second alternative model on this provider
    pub tertiary_model: Option<String>,
    /// First alternative provider
    pub secondary_provider: Option<Vendor>,
    /// Second alternative provider
    pub tertiary_provider: Option<Vendor>,
}

impl FallbackPolicy {
    /// Policy from a provider's settings
    pub fn from_settings(default_model: Option<String>, fallback: &FallbackSettings) -> Self {
        Self {
            default_model,
            secondary_model: fallback.secondary_model.clone(),
            tertiary_model: fallback.tertiary_model.clone(),
            secondary_provider: fallback.secondary_provider,
            tertiary_provider: fallback.tertiary_provider,
        }
    }
}

/// Build the ordered candidates for a request
///
/// The requested pair comes first, followed by the provider's alternative
/// models, then each alternative provider's default, secondary and tertiary
/// models. Duplicates and candidates whose provider is not registered are
/// dropped.
pub fn build_chain(
    provider: Vendor,
    model: &str,
    policies: &BTreeMap<Vendor, FallbackPolicy>,
    is_registered: impl Fn(Vendor) -> bool,
) -> Vec<Candidate> {
    let empty = FallbackPolicy::default();
    let policy_for = |vendor: Vendor| policies.get(&vendor).unwrap_or(&empty);

    let mut chain: Vec<Candidate> = Vec::new();
    let mut push = |vendor: Vendor, model: Option<&str>| {
        let Some(model) = model.filter(|m| !m.trim().is_empty()) else {
            return;
        };
        if !is_registered(vendor) {
            return;
        }
        if chain.iter().any(|c| c.provider == vendor && c.model == model) {
            return;
        }
        chain.push(Candidate::new(vendor, model));
    };

    let primary = policy_for(provider);
    push(provider, Some(model));
    push(provider, primary.secondary_model.as_deref());
    push(provider, primary.tertiary_model.as_deref());

    for alternative in [primary.secondary_provider, primary.tertiary_provider]
        .into_iter()
        .flatten()
    {
        let policy = policy_for(alternative);
        let default_model = policy.default_model.as_deref().or_else(|| alternative.default_model());
        push(alternative, default_model);
        push(alternative, policy.secondary_model.as_deref());
        push(alternative, policy.tertiary_model.as_deref());
    }

    chain
}
