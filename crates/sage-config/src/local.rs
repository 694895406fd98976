use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::llm::{default_enabled, parse_timeout};

/// Locally served models
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalSettings {
    /// Set to false to keep the section without registering the local vendor
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directory that relative model paths are resolved against
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Endpoint of the local runtime server
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Per-request timeout (e.g. "5m")
    #[serde(default)]
    pub timeout: Option<String>,
    /// Models that may be loaded
    #[serde(default)]
    pub models: Vec<LocalModelSettings>,
}

impl LocalSettings {
    /// Parsed request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout string is not a valid duration
    pub fn timeout(&self) -> anyhow::Result<Option<Duration>> {
        parse_timeout(self.timeout.as_deref())
    }
}

/// One configured local model
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalModelSettings {
    /// Identifier used after the `local:` prefix
    pub id: String,
    /// Backend family that serves the model
    pub kind: LocalModelKind,
    /// Model file path (relative to `models_dir`) or runtime model tag
    pub path: String,
    /// Context window passed to the runtime
    #[serde(default)]
    pub context_length: Option<u32>,
}

/// Backend family for a local model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LocalModelKind {
    /// Model tag pulled into an Ollama-compatible server
    Ollama,
    /// GGUF weights file on disk
    Gguf,
}

impl LocalModelKind {
    /// Whether `path` names a file that must exist before loading
    pub const fn is_file_backed(self) -> bool {
        matches!(self, Self::Gguf)
    }
}
