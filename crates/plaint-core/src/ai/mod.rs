//! Pluggable language model backend abstraction
//!
//! # Architecture
//!
//! - `AIBackend` trait: the three complaint operations plus health/identity
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let ai = AIClient::from_env();
//!
//! if let Some(ref client) = ai {
//!     let category = client.classify_complaint("电视黑屏", &["电视", "冰箱"], "未知").await?;
//!     println!("Category: {}", category);
//! }
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `LLM_MODE`: `mock` disables the model entirely (regex classification only)
//! - `AI_BACKEND`: `openai_compatible`, `ollama`, `mock` or `none`.
//!   Unset: `openai_compatible` when a host is configured, else `ollama` when
//!   `OLLAMA_HOST` is set, else no model
//! - `OPENAI_COMPATIBLE_HOST` / `BASE_URL`: server URL
//! - `OPENAI_COMPATIBLE_MODEL` / `MODEL_NAME`: model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY` / `API_KEY`: bearer key (optional)
//! - `OLLAMA_HOST`: Ollama server URL
//! - `OLLAMA_MODEL`: model name (default: llama3.2)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all language model backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Pick one of `categories` for the complaint text, or `fallback`
    async fn classify_complaint(
        &self,
        text: &str,
        categories: &[&str],
        fallback: &str,
    ) -> Result<String>;

    /// Write a customer-facing reply for a classified complaint
    ///
    /// An empty string means the model produced nothing usable.
    async fn generate_reply(&self, text: &str, category: &str) -> Result<String>;

    /// Translate a natural language query into a filter expression
    ///
    /// `now` is the reference time shown to the model. An empty string means
    /// the query has no filter conditions.
    async fn parse_query(&self, query: &str, now: &str, categories: &[&str]) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL
    fn host(&self) -> &str;
}

/// Concrete AI client that wraps all supported backends
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI chat-completions API (hosted or self-hosted)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

/// Read the first non-empty variable among `names`
fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Returns None when the model is disabled or its host is not configured,
    /// in which case callers fall back to regex classification.
    pub fn from_env() -> Option<Self> {
        if env_any(&["LLM_MODE"]).is_some_and(|mode| mode.eq_ignore_ascii_case("mock")) {
            tracing::info!("LLM_MODE=mock, language model disabled");
            return None;
        }

        let backend = env_any(&["AI_BACKEND"]).map(|b| b.to_lowercase());

        match backend.as_deref() {
            None => OpenAICompatibleBackend::from_env()
                .map(AIClient::OpenAICompatible)
                .or_else(|| OllamaBackend::from_env().map(AIClient::Ollama)),
            Some("none" | "off" | "disabled") => None,
            Some("openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp") => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            Some("ollama") => OllamaBackend::from_env().map(AIClient::Ollama),
            Some("mock") => Some(AIClient::Mock(MockBackend::new())),
            Some(other) => {
                tracing::warn!(backend = %other, "Unknown AI_BACKEND, falling back to openai_compatible");
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create an OpenAI-compatible backend directly
    pub fn openai_compatible(host: &str, model: &str, api_key: Option<&str>) -> Self {
        let backend = match api_key {
            Some(key) => OpenAICompatibleBackend::with_api_key(host, model, key),
            None => OpenAICompatibleBackend::new(host, model),
        };
        AIClient::OpenAICompatible(backend)
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Short backend name for status output
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Ollama(_) => "ollama",
            AIClient::Mock(_) => "mock",
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Ollama(b) => AIClient::Ollama(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn classify_complaint(
        &self,
        text: &str,
        categories: &[&str],
        fallback: &str,
    ) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.classify_complaint(text, categories, fallback).await,
            AIClient::Ollama(b) => b.classify_complaint(text, categories, fallback).await,
            AIClient::Mock(b) => b.classify_complaint(text, categories, fallback).await,
        }
    }

    async fn generate_reply(&self, text: &str, category: &str) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.generate_reply(text, category).await,
            AIClient::Ollama(b) => b.generate_reply(text, category).await,
            AIClient::Mock(b) => b.generate_reply(text, category).await,
        }
    }

    async fn parse_query(&self, query: &str, now: &str, categories: &[&str]) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.parse_query(query, now, categories).await,
            AIClient::Ollama(b) => b.parse_query(query, now, categories).await,
            AIClient::Mock(b) => b.parse_query(query, now, categories).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
