//! `OpenRouter` provider: the `OpenAI` wire format plus attribution headers

use ::http::header::{HeaderMap, HeaderName, HeaderValue};
use async_trait::async_trait;

use super::openai::{ModelFamily, OpenAiProvider};
use super::{Provider, ProviderConfig, ProviderInfo};
use crate::error::LlmError;
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse};

/// Referer sent for request attribution
const REFERER: &str = "https://github.com/sage-study/sage";

/// Application title sent for request attribution
const TITLE: &str = "Sage";

/// `OpenRouter` provider
pub struct OpenRouterProvider {
    inner: OpenAiProvider,
}

impl OpenRouterProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if the HTTP client cannot be built
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("http-referer"), HeaderValue::from_static(REFERER));
        headers.insert(HeaderName::from_static("x-title"), HeaderValue::from_static(TITLE));

        Ok(Self {
            inner: OpenAiProvider::with_family(config, headers, ModelFamily::Namespaced)?,
        })
    }
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn describe(&self) -> ProviderInfo {
        self.inner.describe()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.inner.complete(request).await
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        self.inner.complete_stream(request).await
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.inner.list_models().await
    }
}
