use std::collections::HashSet;
use std::path::Path;

use crate::{Settings, Vendor};

impl Settings {
    /// Load settings from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let settings = Self::from_toml(&raw)?;

        tracing::debug!(
            path = %path.display(),
            providers = settings.providers.len(),
            local = settings.local.is_some(),
            "loaded settings"
        );

        Ok(settings)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let settings: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate that the settings are internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_defaults()?;
        self.validate_providers()?;
        self.validate_local()?;
        Ok(())
    }

    fn validate_defaults(&self) -> anyhow::Result<()> {
        if let Some(temperature) = self.defaults.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            anyhow::bail!("defaults.temperature must be between 0 and 2, got {temperature}");
        }

        if self.defaults.max_tokens == Some(0) {
            anyhow::bail!("defaults.max_tokens must be greater than 0");
        }

        if let Some(top_p) = self.defaults.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            anyhow::bail!("defaults.top_p must be between 0 and 1, got {top_p}");
        }

        if self.default_model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            anyhow::bail!("default_model must not be empty");
        }

        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        for (vendor, provider) in &self.providers {
            if *vendor == Vendor::Local {
                anyhow::bail!("local models are configured under [local], not [providers.local]");
            }

            provider
                .timeout()
                .map_err(|e| anyhow::anyhow!("invalid timeout for provider '{vendor}': {e}"))?;

            let fallback = &provider.fallback;
            for alternative in [fallback.secondary_provider, fallback.tertiary_provider]
                .into_iter()
                .flatten()
            {
                if alternative == *vendor {
                    anyhow::bail!("provider '{vendor}' cannot list itself as a fallback provider");
                }
            }

            if fallback.secondary_provider.is_some() && fallback.secondary_provider == fallback.tertiary_provider {
                anyhow::bail!("provider '{vendor}' has the same secondary and tertiary fallback provider");
            }
        }

        Ok(())
    }

    fn validate_local(&self) -> anyhow::Result<()> {
        let Some(ref local) = self.local else {
            return Ok(());
        };

        local
            .timeout()
            .map_err(|e| anyhow::anyhow!("invalid timeout for local models: {e}"))?;

        let mut seen = HashSet::new();
        for model in &local.models {
            if model.id.trim().is_empty() {
                anyhow::bail!("local model ids must not be empty");
            }
            if !seen.insert(model.id.as_str()) {
                anyhow::bail!("duplicate local model id '{}'", model.id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use crate::{LocalModelKind, LogFormat, Settings, Vendor};

    const FULL: &str = r#"
default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"

[defaults]
temperature = 0.7
max_tokens = 2048

[providers.anthropic]
api_key = "sk-ant"
timeout = "90s"

[providers.anthropic.fallback]
secondary_model = "claude-3-5-haiku-20241022"
secondary_provider = "openai"

[providers.openai]
api_key = "sk-openai"
default_model = "gpt-4o"
models = ["gpt-4o", "gpt-4o-mini"]

[local]
models_dir = "/var/models"

[[local.models]]
id = "llama"
kind = "ollama"
path = "llama3.1:8b"

[logging]
level = "debug"
format = "json"
"#;

    #[test]
    fn parses_full_document() {
        let settings = Settings::from_toml(FULL).unwrap();

        assert_eq!(settings.default_provider, Some(Vendor::Anthropic));
        assert_eq!(settings.defaults.max_tokens, Some(2048));
        assert_eq!(settings.providers.len(), 2);

        let anthropic = settings.provider(Vendor::Anthropic).unwrap();
        assert_eq!(anthropic.credential().unwrap().expose_secret(), "sk-ant");
        assert_eq!(anthropic.timeout().unwrap(), Some(std::time::Duration::from_secs(90)));
        assert_eq!(anthropic.fallback.secondary_provider, Some(Vendor::OpenAi));

        let local = settings.local.as_ref().unwrap();
        assert_eq!(local.models[0].kind, LocalModelKind::Ollama);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let settings = Settings::from_toml("[providers.google]\napi_key = \"  \"\n").unwrap();
        assert!(settings.provider(Vendor::Google).unwrap().credential().is_none());
    }

    #[test]
    fn optional_credential_from_env_default() {
        temp_env::with_var_unset("SAGE_LOADER_KEY", || {
            let raw = "[providers.openai]\napi_key = \"{{ env.SAGE_LOADER_KEY | default(\"\") }}\"\n";
            let settings = Settings::from_toml(raw).unwrap();
            assert!(settings.provider(Vendor::OpenAi).unwrap().credential().is_none());
        });
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let err = Settings::from_toml("[defaults]\ntemperature = 2.5\n").unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn rejects_self_fallback() {
        let raw = "[providers.openai]\napi_key = \"k\"\n[providers.openai.fallback]\nsecondary_provider = \"openai\"\n";
        let err = Settings::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("itself"));
    }

    #[test]
    fn rejects_local_under_providers() {
        let err = Settings::from_toml("[providers.local]\napi_key = \"k\"\n").unwrap_err();
        assert!(err.to_string().contains("[local]"));
    }

    #[test]
    fn rejects_bad_timeout() {
        let err = Settings::from_toml("[providers.openai]\ntimeout = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn rejects_duplicate_local_ids() {
        let raw = r#"
[[local.models]]
id = "a"
kind = "gguf"
path = "a.gguf"

[[local.models]]
id = "a"
kind = "ollama"
path = "a"
"#;
        let err = Settings::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(Settings::from_toml("unknown = 1\n").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.default_model.as_deref(), Some("claude-sonnet-4-20250514"));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = Settings::load(std::path::Path::new("/nonexistent/sage.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
