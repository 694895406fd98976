use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Supported model vendor families
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Vendor {
    /// `OpenAI` chat completions API
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
    /// Google Generative Language API
    Google,
    /// `OpenRouter` namespaced-model gateway (OpenAI-compatible wire format)
    OpenRouter,
    /// Models served by a local runtime
    Local,
}

impl Vendor {
    /// Order in which vendors are considered when no default provider is configured
    pub const PRIORITY: [Self; 5] = [Self::OpenAi, Self::Anthropic, Self::Google, Self::OpenRouter, Self::Local];

    /// Human-readable vendor name
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google Gemini",
            Self::OpenRouter => "OpenRouter",
            Self::Local => "Local Models",
        }
    }

    /// Endpoint used when the configuration does not override it
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Local => "http://127.0.0.1:11434",
        }
    }

    /// Built-in default model, used when neither request nor config names one
    pub const fn default_model(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("gpt-4o-mini"),
            Self::Anthropic => Some("claude-sonnet-4-20250514"),
            Self::Google => Some("gemini-1.5-flash"),
            Self::OpenRouter => Some("openai/gpt-4o-mini"),
            Self::Local => None,
        }
    }

    /// Whether the vendor is only registered when a credential is present
    pub const fn requires_credential(self) -> bool {
        !matches!(self, Self::Local)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn tags_round_trip_through_strings() {
        for vendor in Vendor::PRIORITY {
            assert_eq!(Vendor::from_str(vendor.as_ref()).unwrap(), vendor);
        }
        assert_eq!(Vendor::OpenRouter.to_string(), "openrouter");
        assert_eq!(Vendor::OpenAi.to_string(), "openai");
    }

    #[test]
    fn only_local_skips_credentials() {
        assert!(!Vendor::Local.requires_credential());
        assert!(Vendor::Google.requires_credential());
    }
}
