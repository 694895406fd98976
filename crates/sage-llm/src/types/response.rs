use serde::{Deserialize, Serialize};

use super::message::Message;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Output was withheld by a safety filter
    ContentFilter,
}

impl FinishReason {
    /// Map any vendor's stop reason onto the neutral set
    pub fn parse(reason: &str) -> Option<Self> {
        match reason {
            "stop" | "end_turn" | "stop_sequence" | "STOP" => Some(Self::Stop),
            "length" | "max_tokens" | "MAX_TOKENS" => Some(Self::Length),
            "tool_calls" | "tool_use" | "function_call" => Some(Self::ToolCalls),
            "content_filter" | "SAFETY" | "RECITATION" | "refusal" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

/// Token usage statistics; zero when the vendor omits them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Sum of prompt and completion tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Usage with the total derived from its parts
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice
    pub index: u32,
    /// Generated assistant message
    pub message: Message,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
}

/// Vendor-neutral completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique response identifier
    pub id: String,
    /// Model that produced the response
    pub model: String,
    /// Unix timestamp of creation
    pub created: u64,
    /// Generated choices
    pub choices: Vec<Choice>,
    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,
}

impl CompletionResponse {
    /// Text of the first choice, or an empty string
    pub fn text(&self) -> &str {
        self.choices.first().map_or("", |c| c.message.content.as_str())
    }
}

/// Current Unix time in seconds
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
