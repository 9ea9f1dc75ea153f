//! Mock backend for testing
//!
//! Deterministic answers for every operation, useful for unit tests and for
//! running the service without a model server.

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::AIBackend;

/// Mock AI backend for testing
///
/// Classification picks the first category named in the text. Replies and
/// query translations are fixed-format strings.
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Make every operation fail (exercises fallbacks)
    pub failing: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            failing: false,
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            failing: false,
        }
    }

    /// Create a mock whose operations all return errors
    pub fn failing() -> Self {
        Self {
            healthy: false,
            failing: true,
        }
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(Error::Ai("mock backend configured to fail".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn classify_complaint(
        &self,
        text: &str,
        categories: &[&str],
        fallback: &str,
    ) -> Result<String> {
        self.check()?;
        let lowered = text.to_lowercase();
        Ok(categories
            .iter()
            .find(|c| lowered.contains(&c.to_lowercase()))
            .map(|c| c.to_string())
            .unwrap_or_else(|| fallback.to_string()))
    }

    async fn generate_reply(&self, _text: &str, category: &str) -> Result<String> {
        self.check()?;
        Ok(format!("您好，关于您的{}问题，我们已记录并会尽快处理。", category))
    }

    async fn parse_query(&self, query: &str, _now: &str, _categories: &[&str]) -> Result<String> {
        self.check()?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(String::new());
        }
        let escaped = query.replace('\\', "\\\\").replace('\'', "\\'");
        Ok(format!("Complaint.content.contains('{}')", escaped))
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATEGORIES: &[&str] = &["电视", "冰箱", "洗衣机"];

    #[tokio::test]
    async fn test_mock_classify() {
        let mock = MockBackend::new();
        assert_eq!(
            mock.classify_complaint("洗衣机漏水", CATEGORIES, "未知")
                .await
                .unwrap(),
            "洗衣机"
        );
        assert_eq!(
            mock.classify_complaint("快递太慢", CATEGORIES, "未知")
                .await
                .unwrap(),
            "未知"
        );
    }

    #[tokio::test]
    async fn test_mock_reply_mentions_category() {
        let mock = MockBackend::new();
        let reply = mock.generate_reply("电视黑屏", "电视").await.unwrap();
        assert!(reply.contains("电视"));
    }

    #[tokio::test]
    async fn test_mock_parse_query() {
        let mock = MockBackend::new();
        assert_eq!(mock.parse_query("  ", "", &[]).await.unwrap(), "");
        assert_eq!(
            mock.parse_query("噪音", "", &[]).await.unwrap(),
            "Complaint.content.contains('噪音')"
        );
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let mock = MockBackend::failing();
        assert!(mock.generate_reply("x", "电视").await.is_err());
        assert!(!mock.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_health() {
        assert!(MockBackend::new().health_check().await);
        assert!(!MockBackend::unhealthy().health_check().await);
    }
}
