//! Ollama-compatible local runtime wire format types

use serde::{Deserialize, Serialize};

/// `/api/chat` request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatRequest {
    /// Model tag
    pub model: String,
    /// Conversation messages
    pub messages: Vec<OllamaMessage>,
    /// Whether to stream line-delimited JSON
    pub stream: bool,
    /// Sampling options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
    /// Tool definitions (`OpenAI` function format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

/// Chat message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaMessage {
    /// Role
    pub role: String,
    /// Text content
    #[serde(default)]
    pub content: String,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    /// Function call
    pub function: OllamaFunctionCall,
}

/// Function call with structured arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    /// Function name
    pub name: String,
    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Runtime sampling options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Context window size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Random seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// `/api/chat` response; each NDJSON line of a stream is one of these
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaChatResponse {
    /// Model tag
    #[serde(default)]
    pub model: String,
    /// Message fragment (or full message when not streaming)
    #[serde(default)]
    pub message: OllamaMessage,
    /// Whether this is the final line
    #[serde(default)]
    pub done: bool,
    /// Why generation stopped ("stop", "length")
    #[serde(default)]
    pub done_reason: Option<String>,
    /// Prompt tokens (final line only)
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
    /// Generated tokens (final line only)
    #[serde(default)]
    pub eval_count: Option<u32>,
}

/// One NDJSON line: a response or an embedded error
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OllamaStreamLine {
    /// Embedded error
    Error {
        /// Error message
        error: String,
    },
    /// Regular line
    Chunk(OllamaChatResponse),
}

/// `/api/show` request, used to check a tag is available
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaShowRequest {
    /// Model tag
    pub model: String,
}

/// `/api/generate` request used to preload or evict a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaKeepAliveRequest {
    /// Model tag
    pub model: String,
    /// How long to keep the model resident; 0 evicts it
    pub keep_alive: serde_json::Value,
}
