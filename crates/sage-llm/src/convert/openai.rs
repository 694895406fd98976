//! Conversion between neutral types and the `OpenAI` wire format

use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiErrorDetail, OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiResponse,
    OpenAiStreamChunk, OpenAiTool, OpenAiToolCall,
};
use crate::types::response::unix_now;
use crate::types::{
    Choice, CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamChunk, StreamDelta,
    StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, Usage,
};

// -- Outbound: neutral request -> OpenAI wire request --

impl From<&CompletionRequest> for OpenAiRequest {
    fn from(req: &CompletionRequest) -> Self {
        Self {
            model: req.model.clone(),
            messages: req.messages.iter().map(Into::into).collect(),
            temperature: req.params.temperature,
            top_p: req.params.top_p,
            max_tokens: req.params.max_tokens,
            stop: req.params.stop.clone(),
            frequency_penalty: req.params.frequency_penalty,
            presence_penalty: req.params.presence_penalty,
            seed: req.params.seed,
            stream: None,
            tools: req.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|t| OpenAiTool {
                        tool_type: t.tool_type.clone(),
                        function: OpenAiFunction {
                            name: t.function.name.clone(),
                            description: t.function.description.clone(),
                            parameters: t.function.parameters.clone(),
                        },
                    })
                    .collect()
            }),
            tool_choice: req.tool_choice.as_ref().map(tool_choice_value),
            stream_options: None,
        }
    }
}

impl From<&Message> for OpenAiMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = msg.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect::<Vec<_>>()
        });

        // Assistant turns that only call tools carry `null` content
        let content = if msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content.clone())
        };

        Self {
            role: msg.role.as_str().to_owned(),
            content,
            name: msg.name.clone(),
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

/// Convert a tool choice to its JSON form
pub(crate) fn tool_choice_value(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::None => serde_json::Value::String("none".to_owned()),
        ToolChoice::Auto => serde_json::Value::String("auto".to_owned()),
        ToolChoice::Required => serde_json::Value::String("required".to_owned()),
        ToolChoice::Function { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name }
        }),
    }
}

// -- Inbound: OpenAI wire response -> neutral types --

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let choices = resp
            .choices
            .into_iter()
            .map(|c| {
                let tool_calls = c.message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .map(|tc| ToolCall::new(tc.id, tc.function.name, tc.function.arguments))
                        .collect()
                });

                Choice {
                    index: c.index,
                    message: Message {
                        role: Role::Assistant,
                        content: c.message.content.unwrap_or_default(),
                        name: None,
                        tool_calls,
                        tool_call_id: None,
                    },
                    finish_reason: c.finish_reason.as_deref().and_then(FinishReason::parse),
                }
            })
            .collect();

        Self {
            id: resp.id,
            model: resp.model,
            created: if resp.created == 0 { unix_now() } else { resp.created },
            choices,
            usage: resp
                .usage
                .map(|u| Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        }
    }
}

// -- Stream conversion --

/// Convert one streamed chunk into neutral chunks, one per choice
///
/// A usage-only chunk (empty `choices`) becomes a chunk carrying just usage.
pub fn openai_chunk_to_stream_chunks(chunk: OpenAiStreamChunk) -> Vec<StreamChunk> {
    let usage = chunk.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let mut chunks: Vec<StreamChunk> = chunk
        .choices
        .into_iter()
        .map(|choice| {
            let tool_calls = choice.delta.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|tc| StreamToolCall {
                        index: tc.index,
                        id: tc.id,
                        function: tc.function.map(|f| StreamFunctionCall {
                            name: f.name,
                            arguments: f.arguments,
                        }),
                    })
                    .collect()
            });

            StreamChunk {
                id: chunk.id.clone(),
                index: choice.index,
                delta: StreamDelta {
                    role: choice.delta.role.as_deref().map(Role::parse),
                    content: choice.delta.content,
                    tool_calls,
                },
                finish_reason: choice.finish_reason.as_deref().and_then(FinishReason::parse),
                usage: None,
            }
        })
        .collect();

    if let Some(usage) = usage {
        match chunks.last_mut() {
            Some(last) => last.usage = Some(usage),
            None => chunks.push(StreamChunk {
                id: chunk.id,
                usage: Some(usage),
                ..StreamChunk::default()
            }),
        }
    }

    chunks
}

/// Convert an error object embedded in a stream into an error item
pub fn embedded_error(detail: OpenAiErrorDetail) -> LlmError {
    let status = detail
        .code
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .and_then(|c| u16::try_from(c).ok());

    LlmError::ProviderFailure {
        status,
        message: detail.message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::openai::OpenAiStreamPayload;
    use crate::types::ToolDefinition;

    #[test]
    fn request_preserves_order_roles_and_tool_linkage() {
        let mut request = CompletionRequest::new(
            "gpt-4o",
            vec![
                Message::system("be brief"),
                Message::user("weather?"),
                Message::assistant_tool_calls("", vec![ToolCall::new("call_1", "get_weather", r#"{"city":"Oslo"}"#)]),
                Message::tool("call_1", "cloudy"),
            ],
        );
        request.tools = Some(vec![ToolDefinition::function(
            "get_weather",
            None,
            serde_json::json!({"type": "object"}),
        )]);
        request.tool_choice = Some(ToolChoice::Function {
            name: "get_weather".to_owned(),
        });

        let wire = OpenAiRequest::from(&request);
        let json = serde_json::to_value(&wire).unwrap();

        let roles: Vec<_> = wire.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "tool"]);
        assert!(json["messages"][2]["content"].is_null());
        assert_eq!(json["messages"][2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(json["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(json["tool_choice"]["function"]["name"], "get_weather");
        assert!(json.get("stream").is_none());
    }

    #[test]
    fn response_without_usage_defaults_to_zero() {
        let wire: OpenAiResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "created": 1_700_000_000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi"},
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let response = CompletionResponse::from(wire);
        assert_eq!(response.text(), "hi");
        assert_eq!(response.usage, Usage::default());
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn usage_only_chunk_becomes_usage_chunk() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "choices": [],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap();

        let chunks = openai_chunk_to_stream_chunks(chunk);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].usage, Some(Usage::new(3, 4)));
    }

    #[test]
    fn tool_call_fragments_are_kept() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "choices": [{
                "index": 0,
                "delta": {"tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "f", "arguments": "{\"a\""}}]},
                "finish_reason": null
            }]
        }))
        .unwrap();

        let chunks = openai_chunk_to_stream_chunks(chunk);
        let call = &chunks[0].delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id.as_deref(), Some("call_1"));
        assert_eq!(call.function.as_ref().unwrap().arguments.as_deref(), Some("{\"a\""));
        assert!(!chunks[0].is_terminal());
    }

    #[test]
    fn embedded_error_payload_is_detected() {
        let payload: OpenAiStreamPayload =
            serde_json::from_str(r#"{"error":{"message":"Provider overloaded","code":503}}"#).unwrap();
        let OpenAiStreamPayload::Error(body) = payload else {
            panic!("expected error payload");
        };
        let err = embedded_error(body.error);
        assert!(matches!(err, LlmError::ProviderFailure { status: Some(503), .. }));
        assert!(err.is_retryable());
    }
}
