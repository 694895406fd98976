use serde::{Deserialize, Serialize};

use super::message::Role;
use super::response::{FinishReason, Usage};

/// One incremental unit of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Response identifier shared by every chunk of one stream
    pub id: String,
    /// Choice index this chunk belongs to
    pub index: u32,
    /// Incremental content
    #[serde(default)]
    pub delta: StreamDelta,
    /// Reason generation finished; present on the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Usage statistics, usually on or after the terminal chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// Chunk carrying a text fragment
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            delta: StreamDelta {
                content: Some(content.into()),
                ..StreamDelta::default()
            },
            ..Self::default()
        }
    }

    /// Terminal chunk
    pub fn finish(id: impl Into<String>, reason: FinishReason) -> Self {
        Self {
            id: id.into(),
            finish_reason: Some(reason),
            ..Self::default()
        }
    }

    /// Whether this chunk ends its choice
    pub const fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// What one chunk adds to the message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Role (first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Incremental tool call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<StreamToolCall>>,
}

/// Fragment of a tool call being assembled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamToolCall {
    /// Index of this tool call within the message
    pub index: u32,
    /// Tool call ID (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

/// Name and arguments fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Text appended to the arguments JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}
