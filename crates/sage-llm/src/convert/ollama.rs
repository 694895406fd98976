//! Conversion between neutral types and the Ollama chat format

use super::{encode_arguments, parse_arguments};
use crate::protocol::ollama::{
    OllamaChatRequest, OllamaChatResponse, OllamaFunctionCall, OllamaMessage, OllamaOptions, OllamaToolCall,
};
use crate::types::response::unix_now;
use crate::types::{
    Choice, CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamChunk, StreamDelta,
    StreamFunctionCall, StreamToolCall, ToolCall, Usage,
};

/// Build a chat request addressed to a runtime model tag
pub fn ollama_request(req: &CompletionRequest, tag: &str, context_length: Option<u32>, stream: bool) -> OllamaChatRequest {
    let params = &req.params;
    let options = OllamaOptions {
        temperature: params.temperature,
        top_p: params.top_p,
        num_predict: params.max_tokens,
        num_ctx: context_length,
        stop: params.stop.clone(),
        seed: params.seed,
    };
    let has_options = options.temperature.is_some()
        || options.top_p.is_some()
        || options.num_predict.is_some()
        || options.num_ctx.is_some()
        || options.stop.is_some()
        || options.seed.is_some();

    let tools = req.tools.as_ref().map(|tools| {
        tools
            .iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .collect()
    });

    OllamaChatRequest {
        model: tag.to_owned(),
        messages: req.messages.iter().map(message_to_ollama).collect(),
        stream,
        options: has_options.then_some(options),
        tools,
    }
}

fn message_to_ollama(msg: &Message) -> OllamaMessage {
    let tool_calls = msg.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|tc| OllamaToolCall {
                function: OllamaFunctionCall {
                    name: tc.function.name.clone(),
                    arguments: parse_arguments(&tc.function.arguments),
                },
            })
            .collect()
    });

    OllamaMessage {
        role: msg.role.as_str().to_owned(),
        content: msg.content.clone(),
        tool_calls,
    }
}

fn usage_from(resp: &OllamaChatResponse) -> Option<Usage> {
    (resp.prompt_eval_count.is_some() || resp.eval_count.is_some())
        .then(|| Usage::new(resp.prompt_eval_count.unwrap_or(0), resp.eval_count.unwrap_or(0)))
}

fn finish_reason(resp: &OllamaChatResponse, has_tool_calls: bool) -> Option<FinishReason> {
    if !resp.done {
        return None;
    }
    if has_tool_calls {
        return Some(FinishReason::ToolCalls);
    }
    Some(
        resp.done_reason
            .as_deref()
            .and_then(FinishReason::parse)
            .unwrap_or(FinishReason::Stop),
    )
}

/// Convert a non-streaming chat response, labelling it with the public model id
pub fn ollama_response_to_completion(resp: OllamaChatResponse, model: &str) -> CompletionResponse {
    let usage = usage_from(&resp).unwrap_or_default();
    let calls: Vec<ToolCall> = resp
        .message
        .tool_calls
        .clone()
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, tc)| ToolCall::new(format!("call_{i}"), tc.function.name, encode_arguments(&tc.function.arguments)))
        .collect();
    let finish_reason = finish_reason(&resp, !calls.is_empty());

    CompletionResponse {
        id: format!("local-{}", uuid::Uuid::new_v4()),
        model: model.to_owned(),
        created: unix_now(),
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: Role::Assistant,
                content: resp.message.content,
                name: None,
                tool_calls: (!calls.is_empty()).then_some(calls),
                tool_call_id: None,
            },
            finish_reason,
        }],
        usage,
    }
}

/// Tracks identity and tool-call numbering across NDJSON lines
#[derive(Debug)]
pub struct OllamaStreamState {
    id: String,
    role_sent: bool,
    next_tool_call_index: u32,
    saw_tool_calls: bool,
}

impl Default for OllamaStreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaStreamState {
    /// Create a new stream state with a generated id
    pub fn new() -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            role_sent: false,
            next_tool_call_index: 0,
            saw_tool_calls: false,
        }
    }

    /// Convert one NDJSON line into a chunk, if it carries anything
    pub fn convert(&mut self, resp: OllamaChatResponse) -> Option<StreamChunk> {
        let tool_calls: Vec<StreamToolCall> = resp
            .message
            .tool_calls
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let index = self.next_tool_call_index;
                self.next_tool_call_index += 1;
                StreamToolCall {
                    index,
                    id: Some(format!("call_{index}")),
                    function: Some(StreamFunctionCall {
                        name: Some(tc.function.name),
                        arguments: Some(encode_arguments(&tc.function.arguments)),
                    }),
                }
            })
            .collect();
        self.saw_tool_calls |= !tool_calls.is_empty();

        let finish_reason = finish_reason(&resp, self.saw_tool_calls);
        let usage = if resp.done { usage_from(&resp) } else { None };
        let content = resp.message.content;

        if content.is_empty() && tool_calls.is_empty() && finish_reason.is_none() {
            return None;
        }

        let role = (!self.role_sent).then_some(Role::Assistant);
        self.role_sent = true;

        Some(StreamChunk {
            id: self.id.clone(),
            index: 0,
            delta: StreamDelta {
                role,
                content: (!content.is_empty()).then_some(content),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_options_and_tag() {
        let mut request = CompletionRequest::new("local:llama", vec![Message::user("hi")]);
        request.params.max_tokens = Some(32);

        let wire = ollama_request(&request, "llama3.1:8b", Some(8192), true);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["model"], "llama3.1:8b");
        assert_eq!(json["stream"], true);
        assert_eq!(json["options"]["num_predict"], 32);
        assert_eq!(json["options"]["num_ctx"], 8192);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn request_without_options_omits_them() {
        let request = CompletionRequest::new("local:llama", vec![Message::user("hi")]);
        let json = serde_json::to_value(ollama_request(&request, "llama", None, false)).unwrap();
        assert!(json.get("options").is_none());
    }

    #[test]
    fn response_is_labelled_with_public_model() {
        let wire: OllamaChatResponse = serde_json::from_value(serde_json::json!({
            "model": "llama3.1:8b",
            "message": {"role": "assistant", "content": "Hello"},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 5,
            "eval_count": 2
        }))
        .unwrap();

        let response = ollama_response_to_completion(wire, "local:llama");
        assert_eq!(response.model, "local:llama");
        assert_eq!(response.text(), "Hello");
        assert_eq!(response.usage, Usage::new(5, 2));
        assert_eq!(response.choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn stream_state_skips_empty_lines_and_finishes() {
        let mut state = OllamaStreamState::new();

        let line = |json: serde_json::Value| -> OllamaChatResponse { serde_json::from_value(json).unwrap() };

        let first = state
            .convert(line(serde_json::json!({"message": {"role": "assistant", "content": "Hi"}, "done": false})))
            .unwrap();
        assert_eq!(first.delta.role, Some(Role::Assistant));

        assert!(
            state
                .convert(line(serde_json::json!({"message": {"role": "assistant", "content": ""}, "done": false})))
                .is_none()
        );

        let last = state
            .convert(line(serde_json::json!({
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "length",
                "eval_count": 9
            })))
            .unwrap();
        assert_eq!(last.finish_reason, Some(FinishReason::Length));
        assert_eq!(last.usage, Some(Usage::new(0, 9)));
    }
}
