//! Provider resolution and request defaulting

use sage_config::Vendor;

use crate::provider::local::LOCAL_PREFIX;
use crate::types::{CompletionRequest, PartialRequest};

/// Infer the vendor that serves a model from its id
///
/// Unrecognised ids go to `default`.
pub fn resolve_provider(model: &str, default: Vendor) -> Vendor {
    if model.starts_with(LOCAL_PREFIX) {
        Vendor::Local
    } else if model.starts_with("gpt-") {
        Vendor::OpenAi
    } else if model.starts_with("claude-") {
        Vendor::Anthropic
    } else if model.starts_with("gemini-") {
        Vendor::Google
    } else if model.contains('/') {
        Vendor::OpenRouter
    } else {
        default
    }
}

/// Values used when a request leaves a field unset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDefaults {
    /// Model used when the request names none
    pub model: Option<String>,
    /// Default sampling temperature
    pub temperature: Option<f64>,
    /// Default output token limit
    pub max_tokens: Option<u32>,
    /// Default nucleus sampling threshold
    pub top_p: Option<f64>,
}

/// Fill the unset fields of a partial request
///
/// The model comes from the request, then `defaults.model`, then the default
/// provider's own default model; a blank model counts as unset. Applying
/// the merge to its own output changes nothing.
pub fn merge_request(
    partial: PartialRequest,
    defaults: &RequestDefaults,
    default_provider_model: Option<&str>,
) -> CompletionRequest {
    let model = partial
        .model
        .filter(|m| !m.trim().is_empty())
        .or_else(|| defaults.model.clone())
        .or_else(|| default_provider_model.map(ToOwned::to_owned))
        .unwrap_or_default();

    let mut params = partial.params;
    params.temperature = params.temperature.or(defaults.temperature);
    params.max_tokens = params.max_tokens.or(defaults.max_tokens);
    params.top_p = params.top_p.or(defaults.top_p);

    CompletionRequest {
        model,
        messages: partial.messages,
        params,
        tools: partial.tools,
        tool_choice: partial.tool_choice,
    }
}
