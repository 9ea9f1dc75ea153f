//! Ollama backend implementation
//!
//! HTTP client for the Ollama generate API. The system section of each prompt
//! goes in the request's `system` field.

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

/// Default model when `OLLAMA_MODEL` is unset
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    /// Replace the prompt library
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
            prompts: self.prompts.clone(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = env_any(&["OLLAMA_HOST"])?;
        let model = env_any(&["OLLAMA_MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Some(Self::new(&host, &model))
    }

    fn render(&self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<RenderedPrompt> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        prompts.render(id, vars)
    }

    async fn generate(&self, prompt: RenderedPrompt) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.user,
            system: prompt.system,
            stream: false,
            options: OllamaOptions { temperature: 0.1 },
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Ai(format!("Ollama API error {}: {}", status, body)));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!("Ollama response: {}", ollama_response.response);
        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
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

        let response = self.generate(prompt).await?;
        Ok(parse_category(&response, categories, fallback))
    }

    async fn generate_reply(&self, text: &str, category: &str) -> Result<String> {
        let mut vars = HashMap::new();
        vars.insert("text", text);
        vars.insert("category", category);
        let prompt = self.render(PromptId::GenerateReply, &vars)?;

        let response = self.generate(prompt).await?;
        Ok(parse_reply(&response))
    }

    async fn parse_query(&self, query: &str, now: &str, categories: &[&str]) -> Result<String> {
        let joined = categories.join(",");
        let mut vars = HashMap::new();
        vars.insert("query", query);
        vars.insert("now", now);
        vars.insert("categories", joined.as_str());
        let prompt = self.render(PromptId::ParseQuery, &vars)?;

        let response = self.generate(prompt).await?;
        Ok(parse_filter_expression(&response))
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
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
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.model(), "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
    }

    #[test]
    fn test_with_model() {
        let backend = OllamaBackend::new("http://localhost:11434", "llama3.2");
        let other = backend.with_model("qwen2.5:7b");
        assert_eq!(other.model(), "qwen2.5:7b");
        assert_eq!(other.host(), backend.host());
    }

    #[test]
    fn test_request_omits_missing_system() {
        let request = OllamaRequest {
            model: "m".into(),
            prompt: "p".into(),
            system: None,
            stream: false,
            options: OllamaOptions { temperature: 0.1 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["stream"], false);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let backend = OllamaBackend::new("http://127.0.0.1:9", "llama3.2");
        assert!(!backend.health_check().await);
    }
}
