//! Completion orchestration over multiple model vendors
//!
//! Provides one request/response/stream vocabulary over `OpenAI`, Anthropic,
//! Google, `OpenRouter` and locally served models, with provider resolution,
//! error classification and ordered fallback between providers.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod classify;
pub mod convert;
pub mod error;
pub mod fallback;
pub mod orchestrator;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod resolve;
pub mod stream;
pub mod types;
pub mod validate;

pub use classify::is_retryable;
pub use error::LlmError;
pub use fallback::{Candidate, FallbackPolicy, build_chain};
pub use orchestrator::{Completion, FailedAttempt, ModelReport, Orchestrator, estimate_tokens};
pub use provider::local::{LocalBackend, LocalModel, LocalModelHandle, LocalProvider, OllamaBackend};
pub use provider::{Provider, ProviderConfig, ProviderInfo};
pub use registry::{Registry, RegistryBuilder};
pub use resolve::{RequestDefaults, merge_request, resolve_provider};
pub use stream::CompletionStream;
pub use types::{CompletionRequest, CompletionResponse, Message, PartialRequest, Role, StreamChunk};
pub use validate::validate_request;
