//! Test utilities for plaint-core
//!
//! A mock language model server speaking both the OpenAI chat-completions
//! API and the Ollama generate API. Answers are derived from the rendered
//! prompts in `prompts/*.md`, wrapped in the kind of noise real models add
//! (labels, quotes) so response cleanup is exercised too.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

/// What the mock server has seen
#[derive(Debug, Default)]
struct Recorded {
    requests: usize,
    authorization: Option<String>,
}

#[derive(Clone)]
struct MockState {
    failing: bool,
    recorded: Arc<Mutex<Recorded>>,
}

/// Mock language model server for testing and development
pub struct MockLlmServer {
    addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockLlmServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::start_with(false).await
    }

    /// Start a server that answers every model call with HTTP 500
    pub async fn start_failing() -> Self {
        Self::start_with(true).await
    }

    async fn start_with(failing: bool) -> Self {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = MockState {
            failing,
            recorded: recorded.clone(),
        };

        let app = Router::new()
            .route("/v1/models", get(handle_models))
            .route("/v1/chat/completions", post(handle_chat))
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            recorded,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of model calls received
    pub fn request_count(&self) -> usize {
        self.recorded.lock().map(|r| r.requests).unwrap_or(0)
    }

    /// Authorization header of the most recent chat request
    pub fn last_authorization(&self) -> Option<String> {
        self.recorded
            .lock()
            .ok()
            .and_then(|r| r.authorization.clone())
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockLlmServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

async fn handle_models() -> Json<serde_json::Value> {
    Json(json!({ "object": "list", "data": [{ "id": "mock-model", "object": "model" }] }))
}

async fn handle_tags() -> Json<serde_json::Value> {
    Json(json!({ "models": [{ "name": "llama3.2:latest", "size": 4_000_000_000u64 }] }))
}

/// OpenAI chat completions endpoint
async fn handle_chat(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded.requests += 1;
        recorded.authorization = authorization;
    }

    if state.failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").into_response();
    }

    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": request.model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": answer(prompt) },
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

/// Ollama generate endpoint
async fn handle_generate(
    State(state): State<MockState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Ok(mut recorded) = state.recorded.lock() {
        recorded.requests += 1;
    }

    if state.failing {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").into_response();
    }

    Json(json!({
        "model": request.model,
        "response": answer(&request.prompt),
        "done": true
    }))
    .into_response()
}

/// Answer a rendered prompt the way a cooperative model would
fn answer(prompt: &str) -> String {
    if let Some(categories) = between(prompt, "请严格从[", "]") {
        let text = after(prompt, "投诉内容：").unwrap_or_default();
        let fallback = between(prompt, "则返回'", "'").unwrap_or("未知");
        let category = categories
            .split(',')
            .map(str::trim)
            .find(|c| !c.is_empty() && text.contains(c))
            .unwrap_or(fallback);
        return format!("类别：{}", category);
    }

    if prompt.contains("生成合适的回复") {
        let category = after(prompt, "分类：").unwrap_or_default();
        return format!("“您好，您反映的{}问题我们已收到，将尽快处理。”", category);
    }

    if let Some(query) = after(prompt, "查询内容：") {
        let known = between(prompt, "已知类别：", "\n").unwrap_or_default();
        return known
            .split(',')
            .map(str::trim)
            .find(|c| !c.is_empty() && query.contains(c))
            .map(|c| format!("```python\nComplaint.complaint_category == '{}'\n```", c))
            .unwrap_or_default();
    }

    String::new()
}

fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let rest = &text[text.find(start)? + start.len()..];
    rest.find(end).map(|i| &rest[..i])
}

/// Rest of the line after `marker`
fn after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let rest = &text[text.find(marker)? + marker.len()..];
    Some(rest.lines().next().unwrap_or_default().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_classification() {
        let prompt = "请严格从[电视,冰箱]中选择与下面投诉最匹配的类别，如果没有匹配项则返回'未知'。\n投诉内容：冰箱坏了";
        assert_eq!(answer(prompt), "类别：冰箱");

        let prompt = "请严格从[电视,冰箱]中选择，则返回'未知'。\n投诉内容：快递";
        assert_eq!(answer(prompt), "类别：未知");
    }

    #[test]
    fn test_answer_query() {
        let prompt = "已知类别：电视,冰箱\n查询内容：所有冰箱的投诉\n输出：";
        assert!(answer(prompt).contains("Complaint.complaint_category == '冰箱'"));
        assert_eq!(answer("已知类别：电视\n查询内容：全部\n"), "");
    }

    #[tokio::test]
    async fn test_server_starts_and_stops() {
        let mut server = MockLlmServer::start().await;
        assert!(server.url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.request_count(), 0);
        server.stop();
    }
}
