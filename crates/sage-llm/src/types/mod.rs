//! Vendor-neutral request, response and stream types
//!
//! Every adapter converts its wire format to and from these.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{FunctionCall, Message, Role, ToolCall};
pub use request::{CompletionParams, CompletionRequest, PartialRequest};
pub use response::{Choice, CompletionResponse, FinishReason, Usage};
pub use stream::{StreamChunk, StreamDelta, StreamFunctionCall, StreamToolCall};
pub use tool::{FunctionDefinition, ToolChoice, ToolDefinition};
