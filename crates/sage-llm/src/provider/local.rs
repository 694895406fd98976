//! Locally served models and their load/unload lifecycle
//!
//! Models are declared in settings and must be loaded explicitly before
//! completions can be routed to them. Each model kind is served by a
//! [`LocalBackend`]; the built-in [`OllamaBackend`] talks to an
//! Ollama-compatible runtime over HTTP.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use sage_config::{LocalModelKind, LocalModelSettings, LocalSettings, Vendor};
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use url::Url;

use super::{Provider, ProviderInfo, default_base_url, http};
use crate::convert::ollama::{OllamaStreamState, ollama_request, ollama_response_to_completion};
use crate::error::LlmError;
use crate::protocol::ollama::{OllamaChatResponse, OllamaKeepAliveRequest, OllamaShowRequest, OllamaStreamLine};
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse, StreamChunk};
use crate::validate::validate_request;

/// Prefix that routes a model id to the local provider
pub const LOCAL_PREFIX: &str = "local:";

/// Longest NDJSON line accepted from a runtime stream
const MAX_NDJSON_LINE: usize = 1024 * 1024;

/// Strip the routing prefix from a model id
pub fn local_model_id(model: &str) -> &str {
    model.strip_prefix(LOCAL_PREFIX).unwrap_or(model)
}

/// A configured model with its path resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalModel {
    /// Identifier without the routing prefix
    pub id: String,
    /// Backend family
    pub kind: LocalModelKind,
    /// Absolute file path for file-backed kinds, runtime tag otherwise
    pub path: String,
    /// Context window passed to the runtime
    pub context_length: Option<u32>,
}

/// A loaded model ready to serve completions
#[async_trait]
pub trait LocalModelHandle: Send + Sync {
    /// Non-streaming completion
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError>;

    /// Release runtime resources held for this model
    async fn unload(&self) -> Result<(), LlmError>;
}

/// Instantiates handles for one model kind
#[async_trait]
pub trait LocalBackend: Send + Sync {
    /// Kind of model this backend serves
    fn kind(&self) -> LocalModelKind;

    /// Prepare a model and return its handle
    async fn load(&self, model: &LocalModel) -> Result<Arc<dyn LocalModelHandle>, LlmError>;
}

type HandleCell = Arc<OnceCell<Arc<dyn LocalModelHandle>>>;

/// Provider for locally served models
pub struct LocalProvider {
    info: ProviderInfo,
    models_dir: Option<PathBuf>,
    models: Vec<LocalModelSettings>,
    backends: HashMap<LocalModelKind, Arc<dyn LocalBackend>>,
    loaded: DashMap<String, HandleCell>,
}

impl LocalProvider {
    /// Create from the `[local]` settings, registering the Ollama backend
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the endpoint or timeout is invalid
    pub fn from_settings(settings: &LocalSettings) -> Result<Self, LlmError> {
        let base_url = match settings.base_url {
            Some(ref url) => url.clone(),
            None => default_base_url(Vendor::Local)?,
        };
        let ollama = OllamaBackend::new(base_url.clone(), settings.timeout()?)?;

        Ok(Self::new(base_url, settings.models_dir.clone(), settings.models.clone()).with_backend(Arc::new(ollama)))
    }

    /// Create with no backends registered
    pub fn new(endpoint: Url, models_dir: Option<PathBuf>, models: Vec<LocalModelSettings>) -> Self {
        Self {
            info: ProviderInfo {
                vendor: Vendor::Local,
                display_name: Vendor::Local.display_name().to_owned(),
                endpoint,
            },
            models_dir,
            models,
            backends: HashMap::new(),
            loaded: DashMap::new(),
        }
    }

    /// Register (or replace) the backend for its model kind
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn LocalBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Configured model ids, without the routing prefix
    pub fn configured_models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.id.as_str())
    }

    /// Load a configured model
    ///
    /// Concurrent loads of the same id share one initialisation; loading an
    /// already loaded model is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Validation` for an unknown id, a kind with no
    /// registered backend or a missing model file, and the backend's error
    /// if instantiation fails
    pub async fn load_model(&self, id: &str) -> Result<(), LlmError> {
        let id = local_model_id(id);
        if self.is_model_loaded(id) {
            return Ok(());
        }

        let settings = self
            .models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| LlmError::validation(format!("unknown local model '{id}'")))?;

        let backend = self.backends.get(&settings.kind).cloned().ok_or_else(|| {
            LlmError::validation(format!("no backend available for {} model '{id}'", settings.kind))
        })?;

        let model = self.resolve(settings).await?;

        let cell = Arc::clone(&self.loaded.entry(id.to_owned()).or_default());
        let result = cell
            .get_or_try_init(|| async {
                tracing::info!(model = %model.id, kind = %model.kind, path = %model.path, "loading local model");
                backend.load(&model).await
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(model = %id, error = %e, "failed to load local model");
                self.loaded.remove_if(id, |_, cell| !cell.initialized());
                Err(e)
            }
        }
    }

    /// Unload a model, returning whether it was loaded
    ///
    /// # Errors
    ///
    /// Returns the backend's error if releasing runtime resources fails;
    /// the model is unloaded either way
    pub async fn unload_model(&self, id: &str) -> Result<bool, LlmError> {
        let id = local_model_id(id);
        let Some(cell) = self.loaded.get(id).map(|entry| Arc::clone(entry.value())) else {
            return Ok(false);
        };

        // Waits out a load still in flight; runs only if that load failed
        let settled = cell
            .get_or_try_init(|| async { Err(LlmError::validation(format!("local model '{id}' is not loaded"))) })
            .await;
        let Ok(handle) = settled.map(Arc::clone) else {
            return Ok(false);
        };
        if self.loaded.remove_if(id, |_, current| Arc::ptr_eq(current, &cell)).is_none() {
            return Ok(false);
        }

        tracing::info!(model = %id, "unloading local model");
        handle.unload().await?;
        Ok(true)
    }

    /// Whether a model is loaded and ready
    pub fn is_model_loaded(&self, id: &str) -> bool {
        self.loaded
            .get(local_model_id(id))
            .is_some_and(|cell| cell.initialized())
    }

    /// Ids of every loaded model, sorted
    pub fn loaded_models(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .loaded
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn handle(&self, model: &str) -> Result<Arc<dyn LocalModelHandle>, LlmError> {
        let id = local_model_id(model);
        self.loaded
            .get(id)
            .and_then(|cell| cell.get().cloned())
            .ok_or_else(|| LlmError::validation(format!("local model '{id}' is not loaded")))
    }

    async fn resolve(&self, settings: &LocalModelSettings) -> Result<LocalModel, LlmError> {
        let path = if settings.kind.is_file_backed() {
            let path = resolve_path(self.models_dir.as_deref(), &settings.path);
            let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
            if !exists {
                return Err(LlmError::validation(format!(
                    "model file for '{}' not found: {}",
                    settings.id,
                    path.display()
                )));
            }
            path.display().to_string()
        } else {
            settings.path.clone()
        };

        Ok(LocalModel {
            id: settings.id.clone(),
            kind: settings.kind,
            path,
            context_length: settings.context_length,
        })
    }
}

fn resolve_path(models_dir: Option<&Path>, path: &str) -> PathBuf {
    let path = Path::new(path);
    match models_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

#[async_trait]
impl Provider for LocalProvider {
    fn describe(&self) -> ProviderInfo {
        self.info.clone()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        validate_request(request)?;
        self.handle(&request.model)?.complete(request).await
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        validate_request(request)?;
        self.handle(&request.model)?.complete_stream(request).await
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(self
            .configured_models()
            .map(|id| format!("{LOCAL_PREFIX}{id}"))
            .collect())
    }
}

// -- Ollama-compatible runtime backend --

/// Backend for models pulled into an Ollama-compatible server
pub struct OllamaBackend {
    client: Client,
    base_url: Url,
    timeout: Option<Duration>,
}

impl OllamaBackend {
    /// Create a backend for the runtime at `base_url`
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be built
    pub fn new(base_url: Url, timeout: Option<Duration>) -> Result<Self, LlmError> {
        Ok(Self {
            client: http::build_client()?,
            base_url,
            timeout,
        })
    }
}

fn runtime_url(base_url: &Url, path: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{base}{path}")
}

#[async_trait]
impl LocalBackend for OllamaBackend {
    fn kind(&self) -> LocalModelKind {
        LocalModelKind::Ollama
    }

    async fn load(&self, model: &LocalModel) -> Result<Arc<dyn LocalModelHandle>, LlmError> {
        let builder = self
            .client
            .post(runtime_url(&self.base_url, "/api/show"))
            .json(&OllamaShowRequest {
                model: model.path.clone(),
            });

        let _ = http::send(Vendor::Local, builder, self.timeout)
            .await
            .map_err(|e| match e {
                LlmError::ProviderFailure { status: Some(404), .. } => {
                    LlmError::validation(format!("runtime has no model '{}'", model.path))
                }
                other => other,
            })?;

        Ok(Arc::new(OllamaHandle {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            public_id: format!("{LOCAL_PREFIX}{}", model.id),
            tag: model.path.clone(),
            context_length: model.context_length,
        }))
    }
}

struct OllamaHandle {
    client: Client,
    base_url: Url,
    timeout: Option<Duration>,
    public_id: String,
    tag: String,
    context_length: Option<u32>,
}

#[async_trait]
impl LocalModelHandle for OllamaHandle {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let wire_request = ollama_request(request, &self.tag, self.context_length, false);
        let builder = self
            .client
            .post(runtime_url(&self.base_url, "/api/chat"))
            .json(&wire_request);
        let response = http::send(Vendor::Local, builder, self.timeout).await?;

        let wire_response: OllamaChatResponse = http::read_json(Vendor::Local, response).await?;
        Ok(ollama_response_to_completion(wire_response, &self.public_id))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        let wire_request = ollama_request(request, &self.tag, self.context_length, true);
        let builder = self
            .client
            .post(runtime_url(&self.base_url, "/api/chat"))
            .json(&wire_request);
        let response = http::send(Vendor::Local, builder, None).await?;

        let reader = StreamReader::new(response.bytes_stream().map(|r| r.map_err(std::io::Error::other)));
        Ok(CompletionStream::new(ndjson_chunks(reader)))
    }

    async fn unload(&self) -> Result<(), LlmError> {
        let builder = self
            .client
            .post(runtime_url(&self.base_url, "/api/generate"))
            .json(&OllamaKeepAliveRequest {
                model: self.tag.clone(),
                keep_alive: serde_json::json!(0),
            });
        let _ = http::send(Vendor::Local, builder, self.timeout).await?;
        Ok(())
    }
}

/// Decode an NDJSON chat stream into completion chunks
///
/// A line longer than [`MAX_NDJSON_LINE`] ends the stream with an error.
fn ndjson_chunks(
    reader: impl AsyncRead + Send + 'static,
) -> impl Stream<Item = Result<StreamChunk, LlmError>> + Send + 'static {
    let mut state = OllamaStreamState::new();
    FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_NDJSON_LINE)).filter_map(move |line| {
        let item = match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => match serde_json::from_str::<OllamaStreamLine>(&line) {
                Ok(OllamaStreamLine::Chunk(resp)) => state.convert(resp).map(Ok),
                Ok(OllamaStreamLine::Error { error }) => Some(Err(LlmError::provider(error))),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unparseable NDJSON line");
                    None
                }
            },
            Err(e) => Some(Err(LlmError::provider(format!("stream interrupted: {e}")))),
        };
        futures_util::future::ready(item)
    })
}
