//! Anthropic Messages API provider implementation

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{Provider, ProviderConfig, ProviderInfo, http};
use crate::convert::anthropic::AnthropicStreamState;
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicModelList, AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse};
use crate::validate::validate_request;

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be built
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            config,
            client: http::build_client()?,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
        match self.config.api_key {
            Some(ref key) => builder.header("x-api-key", key.expose_secret()),
            None => builder,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn describe(&self) -> ProviderInfo {
        self.config.info()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        validate_request(request)?;

        let wire_request: AnthropicRequest = request.into();
        let builder = self
            .authorize(self.client.post(self.config.endpoint("/messages")))
            .json(&wire_request);
        let response = http::send(self.config.vendor, builder, self.config.timeout).await?;

        let wire_response: AnthropicResponse = http::read_json(self.config.vendor, response).await?;
        Ok(wire_response.into())
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        validate_request(request)?;

        let mut wire_request: AnthropicRequest = request.into();
        wire_request.stream = Some(true);

        let builder = self
            .authorize(self.client.post(self.config.endpoint("/messages")))
            .json(&wire_request);
        let response = http::send(self.config.vendor, builder, None).await?;

        let vendor = self.config.vendor;
        let mut state = AnthropicStreamState::new();
        let chunks = http::sse_events(response)
            .map(move |result| match result {
                Ok(event) => match serde_json::from_str::<AnthropicStreamEvent>(&event.data) {
                    Ok(stream_event) => match state.convert_event(stream_event) {
                        Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                        Err(e) => vec![Err(e)],
                    },
                    Err(e) => {
                        tracing::debug!(provider = %vendor, error = %e, event = %event.event, "skipping unparseable SSE event");
                        Vec::new()
                    }
                },
                Err(e) => vec![Err(e)],
            })
            .flat_map(futures_util::stream::iter);

        Ok(CompletionStream::new(chunks))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let builder = self.authorize(self.client.get(self.config.endpoint("/models")));
        let response = http::send(self.config.vendor, builder, self.config.timeout).await?;
        let listing: AnthropicModelList = http::read_json(self.config.vendor, response).await?;

        let models = listing
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id.starts_with("claude-"))
            .collect();

        Ok(self.config.allowed(models))
    }
}
