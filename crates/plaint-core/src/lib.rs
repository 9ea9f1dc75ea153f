//! Plaint Core Library
//!
//! Shared functionality for the Plaint complaint intake service:
//! - Database access and migrations
//! - Regex pattern classifier driven by category profiles
//! - Pluggable language model backends (OpenAI-compatible, Ollama)
//! - Prompt library for customizable prompts
//! - Restricted query language compiled to parameterized SQL
//! - Demo data simulation and bulk import

pub mod ai;
pub mod analyzer;
pub mod classifier;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod profile;
pub mod prompts;
pub mod query;
pub mod simulate;

/// Test utilities including a mock language model server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use analyzer::ComplaintAnalyzer;
pub use classifier::{Classification, PatternClassifier};
pub use db::{AuditEntry, ComplaintFilter, Database};
pub use error::{Error, Result};
pub use import::{ImportFormat, ImportStats, RawComplaint};
pub use profile::Profile;
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use query::Filter;
