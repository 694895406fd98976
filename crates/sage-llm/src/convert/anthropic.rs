//! Conversion between neutral types and the Anthropic wire format

use super::{encode_arguments, parse_arguments};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicErrorDetail, AnthropicMessage, AnthropicRequest,
    AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent,
    AnthropicTool, AnthropicToolChoice,
};
use crate::types::response::unix_now;
use crate::types::{
    Choice, CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamChunk, StreamDelta,
    StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, Usage,
};

/// Default max tokens when not specified (Anthropic requires this field)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Outbound: neutral request -> Anthropic wire request --

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        let system_parts: Vec<&str> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

        let mut messages: Vec<AnthropicMessage> = Vec::new();
        for msg in req.messages.iter().filter(|m| m.role != Role::System) {
            let converted = internal_message_to_anthropic(msg);

            // Consecutive tool results share one user turn
            if msg.role == Role::Tool
                && let Some(previous) = messages.last_mut()
                && is_tool_result_turn(previous)
                && let (AnthropicContent::Blocks(existing), AnthropicContent::Blocks(new)) =
                    (&mut previous.content, converted.content.clone())
            {
                existing.extend(new);
                continue;
            }

            messages.push(converted);
        }

        let tools = req.tools.as_ref().map(|tools| {
            tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.function.name.clone(),
                    description: t.function.description.clone(),
                    input_schema: t
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object"})),
                })
                .collect()
        });

        Self {
            model: req.model.clone(),
            max_tokens: req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages,
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            stop_sequences: req.params.stop.clone(),
            stream: None,
            tools,
            tool_choice: req.tool_choice.as_ref().map(tool_choice_to_anthropic),
        }
    }
}

fn is_tool_result_turn(message: &AnthropicMessage) -> bool {
    match &message.content {
        AnthropicContent::Blocks(blocks) => {
            message.role == "user"
                && !blocks.is_empty()
                && blocks
                    .iter()
                    .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }))
        }
        AnthropicContent::Text(_) => false,
    }
}

/// Convert a non-system message to an Anthropic turn
fn internal_message_to_anthropic(msg: &Message) -> AnthropicMessage {
    if msg.role == Role::Tool {
        return AnthropicMessage {
            role: "user".to_owned(),
            content: AnthropicContent::Blocks(vec![AnthropicContentBlock::ToolResult {
                tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                content: Some(msg.content.clone()),
            }]),
        };
    }

    let role = if msg.role == Role::Assistant { "assistant" } else { "user" };

    if msg.tool_calls().is_empty() {
        return AnthropicMessage {
            role: role.to_owned(),
            content: AnthropicContent::Text(msg.content.clone()),
        };
    }

    let mut blocks = Vec::new();
    if !msg.content.is_empty() {
        blocks.push(AnthropicContentBlock::Text {
            text: msg.content.clone(),
        });
    }
    for tc in msg.tool_calls() {
        blocks.push(AnthropicContentBlock::ToolUse {
            id: tc.id.clone(),
            name: tc.function.name.clone(),
            input: parse_arguments(&tc.function.arguments),
        });
    }

    AnthropicMessage {
        role: role.to_owned(),
        content: AnthropicContent::Blocks(blocks),
    }
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::None => ("none", None),
        ToolChoice::Auto => ("auto", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Function { name } => ("tool", Some(name.clone())),
    };

    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Inbound: Anthropic wire response -> neutral types --

impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                AnthropicResponseBlock::Text { text } => text_content.push_str(&text),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::new(id, name, encode_arguments(&input)));
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        Self {
            id: resp.id,
            model: resp.model,
            created: unix_now(),
            choices: vec![Choice {
                index: 0,
                message: Message {
                    role: Role::Assistant,
                    content: text_content,
                    name: None,
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                },
                finish_reason: resp.stop_reason.as_deref().and_then(FinishReason::parse),
            }],
            usage: Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
        }
    }
}

// -- Stream conversion --

/// Tracks message identity and tool-call numbering across stream events
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    /// Message id from `message_start`
    id: String,
    /// Input tokens reported at `message_start`
    input_tokens: u32,
    /// Whether the assistant role has been emitted yet
    role_sent: bool,
    /// Sequential index of the tool call currently being streamed
    ///
    /// Anthropic's block index counts text blocks too, so it cannot be used
    /// as the tool-call index.
    current_tool_call_index: u32,
    /// Index the next tool call will receive
    next_tool_call_index: u32,
}

impl AnthropicStreamState {
    /// Create a new stream state tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one stream event into neutral chunks
    ///
    /// # Errors
    ///
    /// Returns the embedded failure when the event is an `error` event
    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Result<Vec<StreamChunk>, LlmError> {
        let chunks = match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.id = message.id;
                self.input_tokens = message.usage.map_or(0, |u| u.input_tokens);
                Vec::new()
            }

            AnthropicStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                AnthropicStreamContentBlock::ToolUse { id, name } => {
                    self.current_tool_call_index = self.next_tool_call_index;
                    self.next_tool_call_index += 1;
                    vec![self.delta(None, Some((Some(id), Some(name), None)))]
                }
                AnthropicStreamContentBlock::Text { text } if !text.is_empty() => {
                    vec![self.delta(Some(text), None)]
                }
                AnthropicStreamContentBlock::Text { .. } | AnthropicStreamContentBlock::Other => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![self.delta(Some(text), None)],
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    vec![self.delta(None, Some((None, None, Some(partial_json))))]
                }
                AnthropicStreamDelta::Other => Vec::new(),
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                let finish_reason = delta.stop_reason.as_deref().and_then(FinishReason::parse);
                let usage = usage.map(|u| Usage::new(self.input_tokens.max(u.input_tokens), u.output_tokens));

                if finish_reason.is_none() && usage.is_none() {
                    Vec::new()
                } else {
                    vec![StreamChunk {
                        id: self.id.clone(),
                        index: 0,
                        delta: StreamDelta::default(),
                        finish_reason,
                        usage,
                    }]
                }
            }

            AnthropicStreamEvent::ContentBlockStop { .. }
            | AnthropicStreamEvent::MessageStop
            | AnthropicStreamEvent::Ping => Vec::new(),

            AnthropicStreamEvent::Error { error } => return Err(embedded_error(error)),
        };

        Ok(chunks)
    }

    fn delta(
        &mut self,
        content: Option<String>,
        tool: Option<(Option<String>, Option<String>, Option<String>)>,
    ) -> StreamChunk {
        let role = (!self.role_sent).then_some(Role::Assistant);
        self.role_sent = true;

        let tool_calls = tool.map(|(id, name, arguments)| {
            vec![StreamToolCall {
                index: self.current_tool_call_index,
                id,
                function: Some(StreamFunctionCall { name, arguments }),
            }]
        });

        StreamChunk {
            id: self.id.clone(),
            index: 0,
            delta: StreamDelta {
                role,
                content,
                tool_calls,
            },
            finish_reason: None,
            usage: None,
        }
    }
}

/// Convert an `error` event payload into an error item
pub fn embedded_error(error: AnthropicErrorDetail) -> LlmError {
    let status = match error.error_type.as_str() {
        "rate_limit_error" => Some(429),
        "overloaded_error" => Some(529),
        "api_error" => Some(500),
        _ => None,
    };

    LlmError::ProviderFailure {
        status,
        message: format!("{}: {}", error.error_type, error.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_joined_into_top_level_field() {
        let request = CompletionRequest::new(
            "claude-sonnet-4-20250514",
            vec![Message::system("one"), Message::user("hi"), Message::system("two")],
        );

        let wire = AnthropicRequest::from(&request);
        assert_eq!(wire.system.as_deref(), Some("one\n\ntwo"));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn consecutive_tool_results_share_one_user_turn() {
        let request = CompletionRequest::new(
            "claude-sonnet-4-20250514",
            vec![
                Message::user("compare"),
                Message::assistant_tool_calls(
                    "checking",
                    vec![
                        ToolCall::new("tu_1", "lookup", r#"{"q":"a"}"#),
                        ToolCall::new("tu_2", "lookup", r#"{"q":"b"}"#),
                    ],
                ),
                Message::tool("tu_1", "A"),
                Message::tool("tu_2", "B"),
            ],
        );

        let wire = AnthropicRequest::from(&request);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(wire.messages.len(), 3);
        assert_eq!(json["messages"][1]["content"][0]["type"], "text");
        assert_eq!(json["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(json["messages"][1]["content"][1]["input"]["q"], "a");
        assert_eq!(json["messages"][2]["role"], "user");
        assert_eq!(json["messages"][2]["content"][0]["tool_use_id"], "tu_1");
        assert_eq!(json["messages"][2]["content"][1]["tool_use_id"], "tu_2");
    }

    #[test]
    fn response_collects_text_and_tool_use() {
        let wire: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "tu_1", "name": "lookup", "input": {"q": "x"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();

        let response = CompletionResponse::from(wire);
        assert_eq!(response.text(), "Let me check.");
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(response.choices[0].message.tool_calls()[0].function.arguments, r#"{"q":"x"}"#);
        assert_eq!(response.usage.total_tokens, 15);
    }

    fn event(json: serde_json::Value) -> AnthropicStreamEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn stream_state_emits_every_converted_chunk() {
        let mut state = AnthropicStreamState::new();

        let start = state
            .convert_event(event(serde_json::json!({
                "type": "message_start",
                "message": {"id": "msg_1", "type": "message", "role": "assistant", "model": "m",
                            "usage": {"input_tokens": 12, "output_tokens": 0}}
            })))
            .unwrap();
        assert!(start.is_empty());

        let text = state
            .convert_event(event(serde_json::json!({
                "type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": "Hel"}
            })))
            .unwrap();
        assert_eq!(text[0].id, "msg_1");
        assert_eq!(text[0].delta.role, Some(Role::Assistant));
        assert_eq!(text[0].delta.content.as_deref(), Some("Hel"));

        let tool = state
            .convert_event(event(serde_json::json!({
                "type": "content_block_start", "index": 1,
                "content_block": {"type": "tool_use", "id": "tu_1", "name": "lookup", "input": {}}
            })))
            .unwrap();
        let call = &tool[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.index, 0);
        assert_eq!(call.id.as_deref(), Some("tu_1"));

        let end = state
            .convert_event(event(serde_json::json!({
                "type": "message_delta",
                "delta": {"stop_reason": "end_turn"},
                "usage": {"output_tokens": 7}
            })))
            .unwrap();
        assert!(end[0].is_terminal());
        assert_eq!(end[0].usage, Some(Usage::new(12, 7)));
    }

    #[test]
    fn error_event_becomes_retryable_error() {
        let mut state = AnthropicStreamState::new();
        let err = state
            .convert_event(event(serde_json::json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
