//! Completion orchestration across registered providers
//!
//! Every request is merged with defaults, resolved to a provider, expanded
//! into a fallback chain and then tried candidate by candidate. Retryable
//! failures advance the chain; anything else is returned unchanged.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::join_all;
use sage_config::{Settings, Vendor};

use crate::error::LlmError;
use crate::fallback::{Candidate, build_chain};
use crate::provider::local::LocalProvider;
use crate::provider::{Provider, ProviderInfo};
use crate::registry::Registry;
use crate::resolve::{merge_request, resolve_provider};
use crate::stream::CompletionStream;
use crate::types::{CompletionRequest, CompletionResponse, Message, PartialRequest};

/// A successful completion together with the attempts that preceded it
#[derive(Debug, Clone)]
pub struct Completion {
    /// Response from the candidate that succeeded
    pub response: CompletionResponse,
    /// Vendor that served the response
    pub provider: Vendor,
    /// Model that served the response
    pub model: String,
    /// Candidates that failed before this one, in order
    pub failed_attempts: Vec<FailedAttempt>,
}

/// One failed candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedAttempt {
    /// Vendor tried
    pub provider: Vendor,
    /// Model tried
    pub model: String,
    /// Error message
    pub message: String,
}

/// Model listings gathered from every provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReport {
    /// Models per vendor; empty for vendors whose listing failed
    pub models: BTreeMap<Vendor, Vec<String>>,
    /// Error message per vendor whose listing failed
    pub failures: BTreeMap<Vendor, String>,
}

/// Result of walking a fallback chain
struct Attempted<T> {
    value: T,
    provider: Vendor,
    model: String,
    failed_attempts: Vec<FailedAttempt>,
}

/// Entry point for completions
///
/// Cheap to clone; clones share one immutable [`Registry`].
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
}

impl Orchestrator {
    /// Wrap a registry
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Register adapters from settings
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if an adapter cannot be constructed
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        Ok(Self::new(Registry::from_settings(settings)?))
    }

    /// Build a new orchestrator from different settings
    ///
    /// `self` and its clones keep using the previous registry.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Internal` if an adapter cannot be constructed
    pub fn reconfigure(&self, settings: &Settings) -> Result<Self, LlmError> {
        tracing::info!("reconfiguring providers");
        Self::from_settings(settings)
    }

    /// The registry this orchestrator routes over
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The local adapter, for model lifecycle calls
    pub fn local(&self) -> Option<&Arc<LocalProvider>> {
        self.registry.local()
    }

    /// Merge defaults and build the fallback chain for a request
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Validation` if no model can be determined and
    /// `LlmError::ProviderNotFound` if no candidate has a registered adapter
    pub fn plan(&self, partial: PartialRequest) -> Result<(CompletionRequest, Vec<Candidate>), LlmError> {
        let default_provider = self.registry.default_provider().unwrap_or(Vendor::PRIORITY[0]);
        let request = merge_request(
            partial,
            self.registry.defaults(),
            self.registry.default_model_for(default_provider),
        );

        if request.model.trim().is_empty() {
            return Err(LlmError::validation("no model specified and no default model configured"));
        }

        let provider = resolve_provider(&request.model, default_provider);
        let chain = build_chain(provider, &request.model, self.registry.policies(), |v| {
            self.registry.is_registered(v)
        });

        if chain.is_empty() {
            return Err(LlmError::ProviderNotFound { provider });
        }

        tracing::debug!(
            provider = %provider,
            model = %request.model,
            candidates = chain.len(),
            "resolved fallback chain"
        );

        Ok((request, chain))
    }

    /// Complete a request, falling back across the chain on transient failures
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error unchanged. Once every candidate
    /// has failed, the last vendor error (rate limit or provider failure) is
    /// returned as is; anything else is wrapped in `LlmError::Exhausted`
    pub async fn complete(&self, partial: PartialRequest) -> Result<CompletionResponse, LlmError> {
        self.complete_with_attempts(partial).await.map(|c| c.response)
    }

    /// Like [`complete`](Self::complete), also reporting which candidates failed
    ///
    /// # Errors
    ///
    /// Same as [`complete`](Self::complete)
    pub async fn complete_with_attempts(&self, partial: PartialRequest) -> Result<Completion, LlmError> {
        let attempted = self
            .drive(partial, |provider, request| async move { provider.complete(&request).await })
            .await?;

        Ok(Completion {
            response: attempted.value,
            provider: attempted.provider,
            model: attempted.model,
            failed_attempts: attempted.failed_attempts,
        })
    }

    /// Stream a completion
    ///
    /// Fallback only happens before the first chunk: each candidate's first
    /// item is awaited, and an error there advances the chain like any other
    /// failure. Once a chunk has been produced the stream is returned as is
    /// and later errors end it without retry.
    ///
    /// # Errors
    ///
    /// Same as [`complete`](Self::complete)
    pub async fn complete_stream(&self, partial: PartialRequest) -> Result<CompletionStream, LlmError> {
        self.drive(partial, open_stream).await.map(|a| a.value)
    }

    /// Walk the fallback chain, running `attempt` for each candidate
    async fn drive<T, F, Fut>(&self, partial: PartialRequest, mut attempt: F) -> Result<Attempted<T>, LlmError>
    where
        F: FnMut(Arc<dyn Provider>, CompletionRequest) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let (request, chain) = self.plan(partial)?;
        let mut failed_attempts: Vec<FailedAttempt> = Vec::new();
        let mut last_error = None;

        for (position, candidate) in chain.into_iter().enumerate() {
            let Some(provider) = self.registry.get(candidate.provider) else {
                continue;
            };

            if position > 0 {
                tracing::warn!(
                    to_provider = %candidate.provider,
                    to_model = %candidate.model,
                    attempt = position + 1,
                    "failing over to alternative provider"
                );
            }

            match attempt(provider, request.with_model(&candidate.model)).await {
                Ok(value) => {
                    if !failed_attempts.is_empty() {
                        tracing::info!(
                            provider = %candidate.provider,
                            model = %candidate.model,
                            failed_attempts = failed_attempts.len(),
                            "completion succeeded after fallback"
                        );
                    }
                    return Ok(Attempted {
                        value,
                        provider: candidate.provider,
                        model: candidate.model,
                        failed_attempts,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        error = %e,
                        "provider failed with non-retryable error"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        error = %e,
                        "provider failed"
                    );
                    failed_attempts.push(FailedAttempt {
                        provider: candidate.provider,
                        model: candidate.model,
                        message: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        let attempts = failed_attempts.len();
        match last_error {
            Some(last) => {
                tracing::error!(attempts, error = %last, "all fallback candidates failed");
                if last.is_provider_domain() {
                    Err(last)
                } else {
                    Err(LlmError::Exhausted {
                        attempts,
                        last: Box::new(last),
                    })
                }
            }
            None => Err(LlmError::ProviderNotFound {
                provider: self.registry.default_provider().unwrap_or(Vendor::PRIORITY[0]),
            }),
        }
    }

    /// Describe every registered provider
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.registry.adapters().map(|(_, adapter)| adapter.describe()).collect()
    }

    /// Check every provider's credential concurrently
    pub async fn validate_credentials(&self) -> BTreeMap<Vendor, bool> {
        let checks = self.registry.adapters().map(|(vendor, adapter)| {
            let adapter = Arc::clone(adapter);
            async move {
                let valid = adapter.validate_credential().await;
                if !valid {
                    tracing::warn!(provider = %vendor, "credential validation failed");
                }
                (vendor, valid)
            }
        });

        join_all(checks).await.into_iter().collect()
    }

    /// Models offered by one provider
    ///
    /// # Errors
    ///
    /// Returns `LlmError::ProviderNotFound` for an unregistered vendor, or
    /// the adapter's error
    pub async fn list_models(&self, vendor: Vendor) -> Result<Vec<String>, LlmError> {
        let adapter = self
            .registry
            .get(vendor)
            .ok_or(LlmError::ProviderNotFound { provider: vendor })?;
        adapter.list_models().await
    }

    /// Models offered by every provider
    ///
    /// A provider whose listing fails contributes an empty list and a
    /// recorded failure instead of failing the whole report.
    pub async fn list_all_models(&self) -> ModelReport {
        let listings = self.registry.adapters().map(|(vendor, adapter)| {
            let adapter = Arc::clone(adapter);
            async move { (vendor, adapter.list_models().await) }
        });

        let mut report = ModelReport::default();
        for (vendor, result) in join_all(listings).await {
            match result {
                Ok(models) => {
                    report.models.insert(vendor, models);
                }
                Err(e) => {
                    tracing::warn!(provider = %vendor, error = %e, "failed to list models");
                    report.models.insert(vendor, Vec::new());
                    report.failures.insert(vendor, e.to_string());
                }
            }
        }
        report
    }
}

/// Open a candidate's stream and wait for its first item
async fn open_stream(provider: Arc<dyn Provider>, request: CompletionRequest) -> Result<CompletionStream, LlmError> {
    let mut stream = provider.complete_stream(&request).await?;

    match stream.next().await {
        Some(Ok(first)) => Ok(CompletionStream::new(
            futures_util::stream::once(futures_util::future::ready(Ok(first))).chain(stream),
        )),
        Some(Err(e)) => Err(e),
        None => Ok(CompletionStream::empty()),
    }
}

/// Rough token count for a conversation, at about four characters per token
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages
        .iter()
        .map(|m| {
            let arguments: usize = m.tool_calls().iter().map(|tc| tc.function.arguments.chars().count()).sum();
            m.content.chars().count() + arguments
        })
        .sum::<usize>()
        .div_ceil(4)
}
