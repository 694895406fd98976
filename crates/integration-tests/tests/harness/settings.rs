//! TOML settings builder for integration tests

use std::fmt::Write;

use sage_config::{Settings, Vendor};

/// Builder for settings documents pointed at mock vendors
#[derive(Default)]
pub struct SettingsBuilder {
    head: String,
    sections: String,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_provider(mut self, vendor: Vendor) -> Self {
        writeln!(self.head, "default_provider = \"{vendor}\"").unwrap();
        self
    }

    pub fn default_model(mut self, model: &str) -> Self {
        writeln!(self.head, "default_model = \"{model}\"").unwrap();
        self
    }

    /// Register a vendor with a test key and a mock base URL
    pub fn provider(self, vendor: Vendor, base_url: &str) -> Self {
        self.provider_with(vendor, base_url, &[])
    }

    /// Register a vendor with extra `key = value` lines in its section
    pub fn provider_with(mut self, vendor: Vendor, base_url: &str, extra: &[&str]) -> Self {
        writeln!(self.sections, "\n[providers.{vendor}]").unwrap();
        writeln!(self.sections, "api_key = \"test-{vendor}-key\"").unwrap();
        writeln!(self.sections, "base_url = \"{base_url}\"").unwrap();
        for line in extra {
            writeln!(self.sections, "{line}").unwrap();
        }
        self
    }

    /// Fallback alternatives for an already registered vendor
    pub fn fallback(mut self, vendor: Vendor, lines: &[&str]) -> Self {
        writeln!(self.sections, "\n[providers.{vendor}.fallback]").unwrap();
        for line in lines {
            writeln!(self.sections, "{line}").unwrap();
        }
        self
    }

    /// Local models served through an Ollama-compatible endpoint
    pub fn local_ollama(mut self, base_url: &str, models: &[(&str, &str)]) -> Self {
        writeln!(self.sections, "\n[local]\nbase_url = \"{base_url}\"").unwrap();
        for (id, tag) in models {
            writeln!(self.sections, "\n[[local.models]]\nid = \"{id}\"\nkind = \"ollama\"\npath = \"{tag}\"").unwrap();
        }
        self
    }

    pub fn toml(&self) -> String {
        format!("{}{}", self.head, self.sections)
    }

    pub fn build(self) -> Settings {
        Settings::from_toml(&self.toml()).expect("test settings should parse")
    }
}
