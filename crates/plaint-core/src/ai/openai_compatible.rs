//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! hosted endpoints (OpenAI, DashScope compatible mode, DeepSeek) as well as
//! self-hosted vLLM, LocalAI or llama-server.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST` or `BASE_URL`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL` or `MODEL_NAME`: Model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY` or `API_KEY`: API key if required (optional)

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::prompts::{PromptId, PromptLibrary, RenderedPrompt};

use super::parsing::{parse_category, parse_filter_expression, parse_reply};
use super::{env_any, AIBackend};

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible backend
///
/// Sends each prompt as a system + user message pair to
/// `{host}/v1/chat/completions`.
///
/// # Example
///
/// ```rust,ignore
/// // DashScope compatible mode
/// export OPENAI_COMPATIBLE_HOST="https://dashscope.aliyuncs.com/compatible-mode"
/// export OPENAI_COMPATIBLE_MODEL="qwen-plus"
/// export OPENAI_COMPATIBLE_API_KEY="sk-..."
///
/// // vLLM
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="Qwen/Qwen2.5-7B-Instruct"
/// ```
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl Clone for OpenAICompatibleBackend {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            prompts: self.prompts.clone(),
        }
    }
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: normalize_base_url(base_url),
            model: model.to_string(),
            api_key: None,
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Replace the prompt library (tests use an embedded-only library)
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            api_key: self.api_key.clone(),
            prompts: self.prompts.clone(),
        }
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST` (or `BASE_URL`)
    pub fn from_env() -> Option<Self> {
        let host = env_any(&["OPENAI_COMPATIBLE_HOST", "BASE_URL"])?;
        let model = env_any(&["OPENAI_COMPATIBLE_MODEL", "MODEL_NAME"])
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut backend = Self::new(&host, &model);
        backend.api_key = env_any(&["OPENAI_COMPATIBLE_API_KEY", "API_KEY"]);
        Some(backend)
    }

    fn render(&self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<RenderedPrompt> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        prompts.render(id, vars)
    }

    /// Make a chat completion request
    async fn chat_completion(&self, prompt: &RenderedPrompt) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.user.clone(),
        });

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.1),
            max_tokens: None,
            stream: false,
        };

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ai(format!("OpenAI API error {}: {}", status, body)));
        }

        let chat_response: ChatCompletionResponse = response.json().await?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| Error::Ai("No response from OpenAI API".into()))
    }
}

/// Accept hosts given with or without a trailing `/v1`
fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    trimmed
        .strip_suffix("/v1")
        .unwrap_or(trimmed)
        .to_string()
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message (content is null for refusals on some servers)
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn classify_complaint(
        &self,
        text: &str,
        categories: &[&str],
        fallback: &str,
    ) -> Result<String> {
        let joined = categories.join(",");
        let mut vars = HashMap::new();
        vars.insert("text", text);
        vars.insert("categories", joined.as_str());
        vars.insert("fallback", fallback);
        let prompt = self.render(PromptId::ClassifyComplaint, &vars)?;

        let response = self.chat_completion(&prompt).await?;
        debug!("OpenAI-compatible classification response: {}", response);

        Ok(parse_category(&response, categories, fallback))
    }

    async fn generate_reply(&self, text: &str, category: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("text", text);
        vars.insert("category", category);
        let prompt = self.render(PromptId::GenerateReply, &vars)?;

        let response = self.chat_completion(&prompt).await?;
        debug!("OpenAI-compatible reply response: {}", response);

        Ok(parse_reply(&response))
    }

    async fn parse_query(&self, query: &str, now: &str, categories: &[&str]) -> Result<String> {
        let joined = categories.join(",");
        let mut vars = HashMap::new();
        vars.insert("query", query);
        vars.insert("now", now);
        vars.insert("categories", joined.as_str());
        let prompt = self.render(PromptId::ParseQuery, &vars)?;

        let response = self.chat_completion(&prompt).await?;
        debug!("OpenAI-compatible query response: {}", response);

        Ok(parse_filter_expression(&response))
    }

    async fn health_check(&self) -> bool {
        let mut req_builder = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        match req_builder.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_new() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000", "qwen-plus");
        assert_eq!(backend.model(), "qwen-plus");
        assert_eq!(backend.host(), "http://localhost:8000");
    }

    #[test]
    fn test_backend_new_trims_trailing_slash_and_version() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000/", "m");
        assert_eq!(backend.host(), "http://localhost:8000");

        let backend = OpenAICompatibleBackend::new("https://api.example.com/v1/", "m");
        assert_eq!(backend.host(), "https://api.example.com");
    }

    #[test]
    fn test_backend_with_api_key() {
        let backend =
            OpenAICompatibleBackend::with_api_key("http://localhost:8000", "gpt-4o", "sk-test123");
        assert_eq!(backend.model(), "gpt-4o");
        assert_eq!(backend.api_key, Some("sk-test123".to_string()));
    }

    #[test]
    fn test_backend_clone_shares_prompts() {
        let backend = OpenAICompatibleBackend::new("http://localhost:8000", "m");
        let other = backend.with_model("other");

        assert_eq!(other.model(), "other");
        assert_eq!(other.host(), backend.host());
        assert!(Arc::ptr_eq(&backend.prompts, &other.prompts));
    }

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "m".into(),
            messages: vec![ChatMessage {
                role: "user",
                content: "hi".into(),
            }],
            temperature: Some(0.1),
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream"], false);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OpenAICompatibleBackend::new("http://127.0.0.1:9", "m");
        assert!(!backend.health_check().await);
    }
}
