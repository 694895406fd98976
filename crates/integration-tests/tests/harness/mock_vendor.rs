//! Mock vendor servers for integration tests
//!
//! Each server speaks one vendor's wire format and returns canned replies.
//! It can fail its first requests with a chosen status, or open streams with
//! an embedded error before any content.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Wire format a mock server speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

/// A request the mock received
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Value,
}

struct MockState {
    flavor: Flavor,
    completion_count: AtomicU32,
    models_count: AtomicU32,
    unload_count: AtomicU32,
    /// Number of requests to fail before succeeding
    fail_count: AtomicU32,
    fail_status: StatusCode,
    stream_error_first: bool,
    response_content: String,
    /// Runtime tags an Ollama mock knows about
    known_tags: Vec<String>,
    requests: Mutex<Vec<Recorded>>,
}

/// Options for starting a mock server
pub struct MockVendorBuilder {
    flavor: Flavor,
    fail_count: u32,
    fail_status: StatusCode,
    stream_error_first: bool,
    response_content: String,
    known_tags: Vec<String>,
}

impl MockVendorBuilder {
    /// Fail the first `n` requests with `status`
    pub fn fail_first(mut self, n: u32, status: StatusCode) -> Self {
        self.fail_count = n;
        self.fail_status = status;
        self
    }

    /// Open every stream with an embedded error instead of content
    pub fn stream_error_first(mut self) -> Self {
        self.stream_error_first = true;
        self
    }

    /// Reply text
    pub fn response(mut self, content: &str) -> Self {
        content.clone_into(&mut self.response_content);
        self
    }

    /// Runtime tags accepted by `/api/show`
    pub fn known_tags(mut self, tags: &[&str]) -> Self {
        self.known_tags = tags.iter().map(|t| (*t).to_owned()).collect();
        self
    }

    pub async fn start(self) -> anyhow::Result<MockVendor> {
        let state = Arc::new(MockState {
            flavor: self.flavor,
            completion_count: AtomicU32::new(0),
            models_count: AtomicU32::new(0),
            unload_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(self.fail_count),
            fail_status: self.fail_status,
            stream_error_first: self.stream_error_first,
            response_content: self.response_content,
            known_tags: self.known_tags,
            requests: Mutex::new(Vec::new()),
        });

        let app = match self.flavor {
            Flavor::OpenAi => Router::new()
                .route("/v1/chat/completions", routing::post(openai_chat))
                .route("/v1/models", routing::get(openai_models)),
            Flavor::Anthropic => Router::new()
                .route("/v1/messages", routing::post(anthropic_messages))
                .route("/v1/models", routing::get(anthropic_models)),
            Flavor::Google => Router::new()
                .route("/v1beta/models/{model_action}", routing::post(google_generate))
                .route("/v1beta/models", routing::get(google_models)),
            Flavor::Ollama => Router::new()
                .route("/api/show", routing::post(ollama_show))
                .route("/api/chat", routing::post(ollama_chat))
                .route("/api/generate", routing::post(ollama_generate)),
        }
        .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(MockVendor { addr, shutdown, state })
    }
}

/// Running mock server, shut down on drop
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockVendor {
    pub fn builder(flavor: Flavor) -> MockVendorBuilder {
        MockVendorBuilder {
            flavor,
            fail_count: 0,
            fail_status: StatusCode::SERVICE_UNAVAILABLE,
            stream_error_first: false,
            response_content: "Hello from mock".to_owned(),
            known_tags: vec!["llama3.1:8b".to_owned()],
        }
    }

    /// Start a server that always succeeds
    pub async fn start(flavor: Flavor) -> anyhow::Result<Self> {
        Self::builder(flavor).start().await
    }

    /// Base URL in the form the matching adapter expects
    pub fn base_url(&self) -> String {
        match self.state.flavor {
            Flavor::OpenAi | Flavor::Anthropic => format!("http://{}/v1", self.addr),
            Flavor::Google => format!("http://{}/v1beta", self.addr),
            Flavor::Ollama => format!("http://{}", self.addr),
        }
    }

    /// Completion requests received, failed ones included
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }

    /// Model listing requests received
    pub fn models_count(&self) -> u32 {
        self.state.models_count.load(Ordering::Relaxed)
    }

    /// Ollama unload requests received
    pub fn unload_count(&self) -> u32 {
        self.state.unload_count.load(Ordering::Relaxed)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Models named in completion request bodies, in order
    pub fn requested_models(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| r.body.get("model").and_then(Value::as_str).map(ToOwned::to_owned))
            .collect()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// -- Shared behaviour --

impl MockState {
    fn record(&self, path: &str, headers: &HeaderMap, body: &Value) {
        self.requests.lock().unwrap().push(Recorded {
            path: path.to_owned(),
            headers: headers.clone(),
            body: body.clone(),
        });
    }

    /// Consume one scheduled failure, if any remain
    fn take_failure(&self) -> Option<Response> {
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining == 0 {
            return None;
        }
        self.fail_count.fetch_sub(1, Ordering::Relaxed);

        let body = if self.flavor == Flavor::Ollama {
            json!({"error": "mock upstream failure"})
        } else {
            json!({"error": {"message": "mock upstream failure", "type": "server_error"}})
        };

        let mut response = (self.fail_status, Json(body)).into_response();
        if self.fail_status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("7"));
        }
        Some(response)
    }

    fn pieces(&self) -> Vec<String> {
        self.response_content.split_inclusive(' ').map(ToOwned::to_owned).collect()
    }
}

fn event_stream(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn sse_data(value: &Value) -> String {
    format!("data: {value}\n\n")
}

fn sse_event(name: &str, value: &Value) -> String {
    format!("event: {name}\ndata: {value}\n\n")
}

fn wants_stream(body: &Value) -> bool {
    body.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

fn model_of(body: &Value) -> String {
    body.get("model").and_then(Value::as_str).unwrap_or_default().to_owned()
}

// -- OpenAI --

async fn openai_chat(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.record("/v1/chat/completions", &headers, &body);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    let model = model_of(&body);

    if !wants_stream(&body) {
        return Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "created": 1_700_000_000,
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": state.response_content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .into_response();
    }

    let mut out = String::new();
    if state.stream_error_first {
        out.push_str(&sse_data(&json!({
            "error": {"message": "The server is overloaded", "type": "server_error", "code": 503}
        })));
        return event_stream(out);
    }

    for (i, piece) in state.pieces().iter().enumerate() {
        let mut delta = json!({"content": piece});
        if i == 0 {
            delta["role"] = json!("assistant");
        }
        out.push_str(&sse_data(&json!({
            "id": "chatcmpl-mock-stream",
            "object": "chat.completion.chunk",
            "created": 1_700_000_000,
            "model": model,
            "choices": [{"index": 0, "delta": delta}]
        })));
    }
    out.push_str(&sse_data(&json!({
        "id": "chatcmpl-mock-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    })));
    out.push_str("data: [DONE]\n\n");
    event_stream(out)
}

async fn openai_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.models_count.fetch_add(1, Ordering::Relaxed);
    state.record("/v1/models", &headers, &Value::Null);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    Json(json!({
        "object": "list",
        "data": [
            {"id": "gpt-4o", "object": "model"},
            {"id": "gpt-4o-mini", "object": "model"},
            {"id": "text-embedding-3-small", "object": "model"},
            {"id": "meta-llama/llama-3-8b-instruct", "object": "model"}
        ]
    }))
    .into_response()
}

// -- Anthropic --

async fn anthropic_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.record("/v1/messages", &headers, &body);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    let model = model_of(&body);

    if !wants_stream(&body) {
        return Json(json!({
            "id": "msg_mock",
            "type": "message",
            "role": "assistant",
            "model": model,
            "content": [{"type": "text", "text": state.response_content}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .into_response();
    }

    let mut out = sse_event(
        "message_start",
        &json!({
            "type": "message_start",
            "message": {"id": "msg_mock_stream", "type": "message", "role": "assistant", "model": model,
                        "content": [], "usage": {"input_tokens": 10, "output_tokens": 0}}
        }),
    );

    if state.stream_error_first {
        out.push_str(&sse_event(
            "error",
            &json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
        ));
        return event_stream(out);
    }

    out.push_str(&sse_event(
        "content_block_start",
        &json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
    ));
    out.push_str(&sse_event("ping", &json!({"type": "ping"})));
    for piece in state.pieces() {
        out.push_str(&sse_event(
            "content_block_delta",
            &json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": piece}}),
        ));
    }
    out.push_str(&sse_event(
        "content_block_stop",
        &json!({"type": "content_block_stop", "index": 0}),
    ));
    out.push_str(&sse_event(
        "message_delta",
        &json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}}),
    ));
    out.push_str(&sse_event("message_stop", &json!({"type": "message_stop"})));
    event_stream(out)
}

async fn anthropic_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.models_count.fetch_add(1, Ordering::Relaxed);
    state.record("/v1/models", &headers, &Value::Null);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    Json(json!({
        "data": [
            {"id": "claude-sonnet-4-20250514", "type": "model"},
            {"id": "claude-3-5-haiku-20241022", "type": "model"}
        ],
        "has_more": false
    }))
    .into_response()
}

// -- Google --

async fn google_generate(
    State(state): State<Arc<MockState>>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.record(&format!("/v1beta/models/{model_action}"), &headers, &body);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    let (model, action) = model_action.split_once(':').unwrap_or((model_action.as_str(), ""));
    let usage = json!({"promptTokenCount": 10, "candidatesTokenCount": 5, "totalTokenCount": 15});

    if action != "streamGenerateContent" {
        return Json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": state.response_content}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": usage,
            "modelVersion": model
        }))
        .into_response();
    }

    if state.stream_error_first {
        return event_stream(sse_data(&json!({
            "error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}
        })));
    }

    let pieces = state.pieces();
    let last = pieces.len().saturating_sub(1);
    let mut out = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        let mut candidate = json!({"content": {"role": "model", "parts": [{"text": piece}]}, "index": 0});
        let mut chunk = json!({"modelVersion": model});
        if i == last {
            candidate["finishReason"] = json!("STOP");
            chunk["usageMetadata"] = usage.clone();
        }
        chunk["candidates"] = json!([candidate]);
        out.push_str(&sse_data(&chunk));
    }
    event_stream(out)
}

async fn google_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.models_count.fetch_add(1, Ordering::Relaxed);
    state.record("/v1beta/models", &headers, &Value::Null);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    Json(json!({
        "models": [
            {"name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
            {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]}
        ]
    }))
    .into_response()
}

// -- Ollama --

async fn ollama_show(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.record("/api/show", &headers, &body);

    let tag = model_of(&body);
    if state.known_tags.contains(&tag) {
        Json(json!({"modelfile": format!("FROM {tag}"), "details": {"format": "gguf"}})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("model '{tag}' not found")})),
        )
            .into_response()
    }
}

async fn ollama_chat(State(state): State<Arc<MockState>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.completion_count.fetch_add(1, Ordering::Relaxed);
    state.record("/api/chat", &headers, &body);

    if let Some(failure) = state.take_failure() {
        return failure;
    }

    let model = model_of(&body);

    if !wants_stream(&body) {
        return Json(json!({
            "model": model,
            "message": {"role": "assistant", "content": state.response_content},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 5
        }))
        .into_response();
    }

    let mut out = String::new();
    if state.stream_error_first {
        out.push_str(&json!({"error": "model runner overloaded"}).to_string());
        out.push('\n');
    } else {
        for piece in state.pieces() {
            out.push_str(&json!({"model": model, "message": {"role": "assistant", "content": piece}, "done": false}).to_string());
            out.push('\n');
        }
        out.push_str(
            &json!({
                "model": model,
                "message": {"role": "assistant", "content": ""},
                "done": true,
                "done_reason": "stop",
                "prompt_eval_count": 10,
                "eval_count": 5
            })
            .to_string(),
        );
        out.push('\n');
    }

    ([(header::CONTENT_TYPE, "application/x-ndjson")], out).into_response()
}

async fn ollama_generate(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/api/generate", &headers, &body);
    if body.get("keep_alive") == Some(&json!(0)) {
        state.unload_count.fetch_add(1, Ordering::Relaxed);
    }
    Json(json!({"model": model_of(&body), "done": true, "done_reason": "unload"})).into_response()
}
