//! OpenAI-compatible provider implementation

use ::http::HeaderMap;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;
use url::Url;

use super::{Provider, ProviderConfig, ProviderInfo, http};
use crate::convert::openai::{embedded_error, openai_chunk_to_stream_chunks};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiModelList, OpenAiRequest, OpenAiResponse, OpenAiStreamOptions, OpenAiStreamPayload};
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse};
use crate::validate::validate_request;

/// Model id prefixes that belong to `OpenAI`'s chat family
const CHAT_MODEL_PREFIXES: &[&str] = &["gpt-", "o1", "o3", "o4", "chatgpt-"];

/// Whether the endpoint is the canonical `OpenAI` API rather than a compatible one
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// Which model ids a listing keeps
#[derive(Debug, Clone, Copy)]
pub(crate) enum ModelFamily {
    /// `OpenAI` chat models
    OpenAi,
    /// Namespaced `vendor/model` ids
    Namespaced,
}

impl ModelFamily {
    fn accepts(self, id: &str) -> bool {
        match self {
            Self::OpenAi => CHAT_MODEL_PREFIXES.iter().any(|p| id.starts_with(p)),
            Self::Namespaced => id.contains('/'),
        }
    }
}

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    config: ProviderConfig,
    client: Client,
    extra_headers: HeaderMap,
    family: ModelFamily,
}

impl OpenAiProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be built
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        Self::with_family(config, HeaderMap::new(), ModelFamily::OpenAi)
    }

    pub(crate) fn with_family(
        config: ProviderConfig,
        extra_headers: HeaderMap,
        family: ModelFamily,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            config,
            client: http::build_client()?,
            extra_headers,
            family,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(self.config.endpoint(path)))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.headers(self.extra_headers.clone());
        match self.config.api_key {
            Some(ref key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn describe(&self) -> ProviderInfo {
        self.config.info()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        validate_request(request)?;

        let wire_request: OpenAiRequest = request.into();
        let builder = self.post("/chat/completions").json(&wire_request);
        let response = http::send(self.config.vendor, builder, self.config.timeout).await?;

        let wire_response: OpenAiResponse = http::read_json(self.config.vendor, response).await?;
        Ok(wire_response.into())
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        validate_request(request)?;

        let mut wire_request: OpenAiRequest = request.into();
        wire_request.stream = Some(true);

        // Compatible APIs commonly reject stream_options
        wire_request.stream_options =
            is_canonical_openai(&self.config.base_url).then_some(OpenAiStreamOptions { include_usage: true });

        let builder = self.post("/chat/completions").json(&wire_request);
        let response = http::send(self.config.vendor, builder, None).await?;

        let vendor = self.config.vendor;
        let chunks = http::sse_events(response)
            .take_while(|result| {
                let done = matches!(result, Ok(event) if event.data.trim() == "[DONE]");
                futures_util::future::ready(!done)
            })
            .map(move |result| match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        return Vec::new();
                    }
                    match serde_json::from_str::<OpenAiStreamPayload>(data) {
                        Ok(OpenAiStreamPayload::Chunk(chunk)) => {
                            openai_chunk_to_stream_chunks(chunk).into_iter().map(Ok).collect()
                        }
                        Ok(OpenAiStreamPayload::Error(body)) => vec![Err(embedded_error(body.error))],
                        Err(e) => {
                            tracing::debug!(provider = %vendor, error = %e, data = %data, "skipping unparseable SSE chunk");
                            Vec::new()
                        }
                    }
                }
                Err(e) => vec![Err(e)],
            })
            .flat_map(futures_util::stream::iter);

        Ok(CompletionStream::new(chunks))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let builder = self.authorize(self.client.get(self.config.endpoint("/models")));
        let response = http::send(self.config.vendor, builder, self.config.timeout).await?;
        let listing: OpenAiModelList = http::read_json(self.config.vendor, response).await?;

        let family = self.family;
        let models = listing
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| family.accepts(id))
            .collect();

        Ok(self.config.allowed(models))
    }
}
