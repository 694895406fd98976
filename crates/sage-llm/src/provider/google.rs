//! Google Gemini provider implementation

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{Provider, ProviderConfig, ProviderInfo, http};
use crate::convert::google::{GoogleStreamState, embedded_error, google_response_to_completion};
use crate::error::LlmError;
use crate::protocol::google::{GoogleModelList, GoogleRequest, GoogleResponse, GoogleStreamPayload};
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse};
use crate::validate::validate_request;

/// Generation method a listed model must support
const GENERATE_METHOD: &str = "generateContent";

/// Google Gemini provider
pub struct GoogleProvider {
    config: ProviderConfig,
    client: Client,
}

impl GoogleProvider {
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
        match self.config.api_key {
            Some(ref key) => builder.header("x-goog-api-key", key.expose_secret()),
            None => builder,
        }
    }

    /// Model path segment, accepting both `gemini-x` and `models/gemini-x`
    fn model_path(model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("/models/{model}")
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn describe(&self) -> ProviderInfo {
        self.config.info()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        validate_request(request)?;

        let wire_request: GoogleRequest = request.into();
        let url = self
            .config
            .endpoint(&format!("{}:generateContent", Self::model_path(&request.model)));
        let builder = self.authorize(self.client.post(url)).json(&wire_request);
        let response = http::send(self.config.vendor, builder, self.config.timeout).await?;

        let wire_response: GoogleResponse = http::read_json(self.config.vendor, response).await?;
        Ok(google_response_to_completion(wire_response, &request.model))
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        validate_request(request)?;

        let wire_request: GoogleRequest = request.into();
        let url = self.config.endpoint(&format!(
            "{}:streamGenerateContent?alt=sse",
            Self::model_path(&request.model)
        ));
        let builder = self.authorize(self.client.post(url)).json(&wire_request);
        let response = http::send(self.config.vendor, builder, None).await?;

        let vendor = self.config.vendor;
        let mut state = GoogleStreamState::new();
        let chunks = http::sse_events(response)
            .map(move |result| match result {
                Ok(event) => match serde_json::from_str::<GoogleStreamPayload>(&event.data) {
                    Ok(GoogleStreamPayload::Chunk(resp)) => state.convert(resp).into_iter().map(Ok).collect(),
                    Ok(GoogleStreamPayload::Error(body)) => vec![Err(embedded_error(body.error))],
                    Err(e) => {
                        tracing::debug!(provider = %vendor, error = %e, "skipping unparseable SSE chunk");
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
        let listing: GoogleModelList = http::read_json(self.config.vendor, response).await?;

        let models = listing
            .models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_METHOD))
            .map(|m| m.name.strip_prefix("models/").unwrap_or(&m.name).to_owned())
            .filter(|id| id.starts_with("gemini-"))
            .collect();

        Ok(self.config.allowed(models))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_strips_resource_prefix() {
        assert_eq!(GoogleProvider::model_path("gemini-2.0-flash"), "/models/gemini-2.0-flash");
        assert_eq!(GoogleProvider::model_path("models/gemini-2.0-flash"), "/models/gemini-2.0-flash");
    }
}
