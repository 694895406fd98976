//! Conversion between neutral types and the Google Generative Language format

use std::collections::HashMap;

use super::{encode_arguments, parse_arguments};
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleContent, GoogleErrorDetail, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration,
    GoogleFunctionResponse, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleResponse, GoogleTool,
    GoogleToolConfig,
};
use crate::types::response::unix_now;
use crate::types::{
    Choice, CompletionRequest, CompletionResponse, FinishReason, Message, Role, StreamChunk, StreamDelta,
    StreamFunctionCall, StreamToolCall, ToolCall, ToolChoice, Usage,
};

impl From<&CompletionRequest> for GoogleRequest {
    fn from(req: &CompletionRequest) -> Self {
        // Google keys function responses by name, not call id
        let call_names: HashMap<&str, &str> = req
            .messages
            .iter()
            .flat_map(Message::tool_calls)
            .map(|tc| (tc.id.as_str(), tc.function.name.as_str()))
            .collect();

        let system_parts: Vec<GooglePart> = req
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| GooglePart::text(m.content.clone()))
            .collect();

        let contents = req
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| message_to_content(m, &call_names))
            .collect();

        let params = &req.params;
        let has_generation_config = params.temperature.is_some()
            || params.top_p.is_some()
            || params.max_tokens.is_some()
            || params.stop.is_some()
            || params.frequency_penalty.is_some()
            || params.presence_penalty.is_some()
            || params.seed.is_some();

        let generation_config = has_generation_config.then(|| GoogleGenerationConfig {
            temperature: params.temperature,
            top_p: params.top_p,
            max_output_tokens: params.max_tokens,
            stop_sequences: params.stop.clone(),
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            seed: params.seed,
        });

        let tools = req.tools.as_ref().map(|tools| {
            vec![GoogleTool {
                function_declarations: tools
                    .iter()
                    .map(|t| GoogleFunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        Self {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| GoogleContent {
                role: None,
                parts: system_parts,
            }),
            generation_config,
            tools,
            tool_config: req.tool_choice.as_ref().map(tool_choice_to_google),
        }
    }
}

fn message_to_content(msg: &Message, call_names: &HashMap<&str, &str>) -> GoogleContent {
    if msg.role == Role::Tool {
        let id = msg.tool_call_id.as_deref().unwrap_or_default();
        let name = call_names.get(id).copied().unwrap_or(id);

        let response = serde_json::from_str::<serde_json::Value>(&msg.content)
            .ok()
            .filter(serde_json::Value::is_object)
            .unwrap_or_else(|| serde_json::json!({ "content": msg.content }));

        return GoogleContent {
            role: Some("user".to_owned()),
            parts: vec![GooglePart::function_response(GoogleFunctionResponse {
                name: name.to_owned(),
                response,
            })],
        };
    }

    let role = if msg.role == Role::Assistant { "model" } else { "user" };

    let mut parts = Vec::new();
    if !msg.content.is_empty() || msg.tool_calls().is_empty() {
        parts.push(GooglePart::text(msg.content.clone()));
    }
    for tc in msg.tool_calls() {
        parts.push(GooglePart::function_call(GoogleFunctionCall {
            name: tc.function.name.clone(),
            args: parse_arguments(&tc.function.arguments),
        }));
    }

    GoogleContent {
        role: Some(role.to_owned()),
        parts,
    }
}

fn tool_choice_to_google(choice: &ToolChoice) -> GoogleToolConfig {
    let (mode, allowed) = match choice {
        ToolChoice::None => ("NONE", None),
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Function { name } => ("ANY", Some(vec![name.clone()])),
    };

    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names: allowed,
        },
    }
}

/// Split a candidate's parts into text and tool calls
fn collect_parts(parts: Vec<GooglePart>, id_prefix: &str) -> (String, Vec<ToolCall>) {
    let mut text = String::new();
    let mut calls = Vec::new();

    for part in parts {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            let id = format!("{id_prefix}_{}", calls.len());
            calls.push(ToolCall::new(id, call.name, encode_arguments(&call.args)));
        }
    }

    (text, calls)
}

fn usage_from(resp: &GoogleResponse) -> Option<Usage> {
    resp.usage_metadata
        .as_ref()
        .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count))
}

/// Convert a `generateContent` response, filling the model from the request
pub fn google_response_to_completion(resp: GoogleResponse, model: &str) -> CompletionResponse {
    let id = resp
        .response_id
        .clone()
        .unwrap_or_else(|| format!("gemini-{}", uuid::Uuid::new_v4()));
    let usage = usage_from(&resp).unwrap_or_default();
    let model = resp.model_version.clone().unwrap_or_else(|| model.to_owned());

    let choices = resp
        .candidates
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| {
            let index = candidate
                .index
                .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
            let (text, calls) = collect_parts(candidate.content.parts, &format!("call_{index}"));

            Choice {
                index,
                message: Message {
                    role: Role::Assistant,
                    content: text,
                    name: None,
                    tool_calls: (!calls.is_empty()).then_some(calls),
                    tool_call_id: None,
                },
                finish_reason: candidate.finish_reason.as_deref().and_then(FinishReason::parse),
            }
        })
        .collect();

    CompletionResponse {
        id,
        model,
        created: unix_now(),
        choices,
        usage,
    }
}

/// Tracks identity and tool-call numbering across Google stream chunks
#[derive(Debug)]
pub struct GoogleStreamState {
    id: String,
    role_sent: bool,
    next_tool_call_index: u32,
}

impl Default for GoogleStreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleStreamState {
    /// Create a new stream state with a generated id
    pub fn new() -> Self {
        Self {
            id: format!("gemini-{}", uuid::Uuid::new_v4()),
            role_sent: false,
            next_tool_call_index: 0,
        }
    }

    /// Convert one streamed response object into neutral chunks
    pub fn convert(&mut self, resp: GoogleResponse) -> Vec<StreamChunk> {
        if let Some(ref response_id) = resp.response_id {
            response_id.clone_into(&mut self.id);
        }
        let usage = usage_from(&resp);

        let mut chunks = Vec::new();
        for candidate in resp.candidates {
            let index = candidate.index.unwrap_or(0);
            let mut content = String::new();
            let mut tool_calls = Vec::new();

            for part in candidate.content.parts {
                if let Some(text) = part.text {
                    content.push_str(&text);
                }
                if let Some(call) = part.function_call {
                    let call_index = self.next_tool_call_index;
                    self.next_tool_call_index += 1;
                    tool_calls.push(StreamToolCall {
                        index: call_index,
                        id: Some(format!("call_{call_index}")),
                        function: Some(StreamFunctionCall {
                            name: Some(call.name),
                            arguments: Some(encode_arguments(&call.args)),
                        }),
                    });
                }
            }

            let finish_reason = candidate.finish_reason.as_deref().and_then(FinishReason::parse);
            if content.is_empty() && tool_calls.is_empty() && finish_reason.is_none() {
                continue;
            }

            let role = (!self.role_sent).then_some(Role::Assistant);
            self.role_sent = true;

            chunks.push(StreamChunk {
                id: self.id.clone(),
                index,
                delta: StreamDelta {
                    role,
                    content: (!content.is_empty()).then_some(content),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason,
                usage: None,
            });
        }

        if let Some(usage) = usage {
            match chunks.last_mut() {
                Some(last) => last.usage = Some(usage),
                None => chunks.push(StreamChunk {
                    id: self.id.clone(),
                    usage: Some(usage),
                    ..StreamChunk::default()
                }),
            }
        }

        chunks
    }
}

/// Convert an embedded error payload into an error item
pub fn embedded_error(error: GoogleErrorDetail) -> LlmError {
    let message = match error.status {
        Some(status) => format!("{status}: {}", error.message),
        None => error.message,
    };

    match error.code {
        401 | 403 => LlmError::Unauthenticated(message),
        429 => LlmError::RateLimited {
            retry_after: None,
            message,
        },
        code => LlmError::ProviderFailure {
            status: Some(code),
            message,
        },
    }
}
