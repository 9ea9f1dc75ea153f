//! Complaint analysis
//!
//! Combines the pattern classifier with an optional language model. The model
//! answers when it is configured and reachable; any model failure falls back
//! to the regex classifier and the profile's reply templates so intake never
//! fails because of the model.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::ai::{AIBackend, AIClient};
use crate::classifier::{Classification, PatternClassifier};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{
    current_time, AiOperation, Analysis, AnalysisSource, NewAiMetric, NewComplaint,
    DB_TIME_FORMAT,
};
use crate::profile::Profile;
use crate::query::{self, Filter};

/// Classifies complaints, writes replies and translates queries
#[derive(Clone)]
pub struct ComplaintAnalyzer {
    classifier: Arc<PatternClassifier>,
    ai: Option<AIClient>,
    metrics: Option<Database>,
}

impl ComplaintAnalyzer {
    /// Analyzer using only the pattern classifier
    pub fn new(classifier: PatternClassifier) -> Self {
        Self {
            classifier: Arc::new(classifier),
            ai: None,
            metrics: None,
        }
    }

    /// Profile from `PLAINT_PROFILE`/`PLAINT_PROFILE_PATH`, model from the AI env vars
    pub fn from_env() -> Result<Self> {
        let classifier = PatternClassifier::new(Profile::from_env()?)?;
        Ok(Self::new(classifier).with_ai(AIClient::from_env()))
    }

    /// Attach (or detach) a language model
    pub fn with_ai(mut self, ai: Option<AIClient>) -> Self {
        self.ai = ai;
        self
    }

    /// Record model call metrics in this database
    pub fn with_metrics(mut self, db: Database) -> Self {
        self.metrics = Some(db);
        self
    }

    pub fn classifier(&self) -> &PatternClassifier {
        &self.classifier
    }

    pub fn ai(&self) -> Option<&AIClient> {
        self.ai.as_ref()
    }

    pub fn profile(&self) -> &Profile {
        self.classifier.profile()
    }

    /// Classify a complaint text
    pub async fn classify(&self, text: &str) -> Result<Classification> {
        let text = non_blank(text)?;

        let Some(ai) = &self.ai else {
            return Ok(self.classifier.classify(text));
        };

        let categories = self.classifier.category_names();
        let fallback = self.classifier.fallback();
        let start = Instant::now();
        let result = ai.classify_complaint(text, &categories, fallback).await;
        self.record(AiOperation::Classify, ai, start, text, &result);

        match result {
            Ok(category) => Ok(Classification {
                category,
                source: AnalysisSource::Llm,
            }),
            Err(e) => {
                warn!("Model classification failed, using patterns: {}", e);
                Ok(self.classifier.classify(text))
            }
        }
    }

    /// Write a reply for a complaint, classifying it first when no category is given
    pub async fn generate_reply(&self, text: &str, category: Option<&str>) -> Result<String> {
        let text = non_blank(text)?;
        let category = match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => category.to_string(),
            None => self.classify(text).await?.category,
        };
        Ok(self.reply_for(text, &category).await)
    }

    /// Classify a text and write its reply
    pub async fn analyze(&self, text: &str) -> Result<Analysis> {
        let text = non_blank(text)?;
        let classification = self.classify(text).await?;
        let reply = self.reply_for(text, &classification.category).await;

        Ok(Analysis {
            category: classification.category,
            reply,
            source: classification.source,
            complaint_id: None,
        })
    }

    /// Fill in the category (and reply, when absent) of a complaint about to be stored
    pub async fn complete(&self, mut complaint: NewComplaint) -> Result<NewComplaint> {
        if complaint.has_category() {
            return Ok(complaint);
        }

        let classification = self.classify(&complaint.content).await?;
        if complaint.reply.is_none() {
            complaint.reply = Some(
                self.reply_for(&complaint.content, &classification.category)
                    .await,
            );
        }
        complaint.complaint_category = Some(classification.category);
        Ok(complaint)
    }

    /// Turn a user query into a filter
    ///
    /// Expression syntax is parsed directly. Other text goes to the model
    /// when one is configured, otherwise it is read as shorthand.
    pub async fn parse_query(&self, q: &str) -> Result<Option<Filter>> {
        let q = q.trim();
        if q.is_empty() {
            return Ok(None);
        }

        let now = current_time();
        let Some(ai) = self.ai.as_ref().filter(|_| !query::looks_like_expression(q)) else {
            return query::parse_query(q, now);
        };

        let categories = self.classifier.category_names();
        let start = Instant::now();
        let result = ai
            .parse_query(q, &now.format(DB_TIME_FORMAT).to_string(), &categories)
            .await;
        self.record(AiOperation::ParseQuery, ai, start, q, &result);

        match result {
            Ok(expression) if expression.is_empty() => Ok(None),
            Ok(expression) => {
                debug!("Query {:?} translated to {:?}", q, expression);
                query::parse_expression(&expression, now).map(Some)
            }
            Err(e) => {
                warn!("Model query translation failed, parsing directly: {}", e);
                query::parse_query(q, now)
            }
        }
    }

    /// Reply from the model, or the profile template when that fails
    async fn reply_for(&self, text: &str, category: &str) -> String {
        let template = || self.classifier.reply_for(category).to_string();

        let Some(ai) = &self.ai else {
            return template();
        };

        let start = Instant::now();
        let result = ai.generate_reply(text, category).await;
        self.record(AiOperation::Reply, ai, start, text, &result);

        match result {
            Ok(reply) if !reply.is_empty() => reply,
            Ok(_) => {
                warn!("Model returned an empty reply, using template");
                template()
            }
            Err(e) => {
                warn!("Model reply failed, using template: {}", e);
                template()
            }
        }
    }

    fn record(
        &self,
        operation: AiOperation,
        ai: &AIClient,
        start: Instant,
        input: &str,
        result: &Result<String>,
    ) {
        let Some(db) = &self.metrics else {
            return;
        };

        let metric = NewAiMetric {
            operation,
            model: ai.model().to_string(),
            latency_ms: start.elapsed().as_millis() as i64,
            success: result.is_ok(),
            error_message: result.as_ref().err().map(|e| e.to_string()),
            input_text: Some(input.to_string()),
            result_text: result.as_ref().ok().cloned(),
        };
        if let Err(e) = db.record_ai_metric(&metric) {
            warn!("Failed to record AI metric: {}", e);
        }
    }
}

fn non_blank(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidData("Complaint text must not be empty".into()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::query::{CompareOp, Field, TextMatch, Value};

    fn pattern_only() -> ComplaintAnalyzer {
        ComplaintAnalyzer::new(PatternClassifier::builtin("appliances").unwrap())
    }

    fn with_mock(mock: MockBackend) -> ComplaintAnalyzer {
        pattern_only().with_ai(Some(AIClient::Mock(mock)))
    }

    #[tokio::test]
    async fn test_pattern_analysis() {
        let analysis = pattern_only().analyze("我的电视无法开机").await.unwrap();
        assert_eq!(analysis.category, "电视");
        assert_eq!(analysis.source, AnalysisSource::Pattern);
        assert!(analysis.reply.contains("电视"));
        assert!(analysis.complaint_id.is_none());
    }

    #[tokio::test]
    async fn test_pattern_fallback() {
        let analysis = pattern_only().analyze("快递送错了").await.unwrap();
        assert_eq!(analysis.category, "未知");
        assert_eq!(analysis.source, AnalysisSource::Fallback);
        assert_eq!(analysis.reply, "感谢您的反馈，我们将尽快处理您的问题。");
    }

    #[tokio::test]
    async fn test_blank_text_rejected() {
        let err = pattern_only().analyze("   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
        assert!(pattern_only().classify("").await.is_err());
    }

    #[tokio::test]
    async fn test_model_analysis() {
        let analysis = with_mock(MockBackend::new())
            .analyze("冰箱不制冷")
            .await
            .unwrap();
        assert_eq!(analysis.category, "冰箱");
        assert_eq!(analysis.source, AnalysisSource::Llm);
        assert!(analysis.reply.starts_with("您好"));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_patterns() {
        let analyzer = with_mock(MockBackend::failing());
        let analysis = analyzer.analyze("洗衣机漏水").await.unwrap();
        assert_eq!(analysis.category, "洗衣机");
        assert_eq!(analysis.source, AnalysisSource::Pattern);
        assert_eq!(
            analysis.reply,
            "感谢您的反馈，我们对您的洗衣机问题表示歉意，将尽快安排维修人员与您联系。"
        );
    }

    #[tokio::test]
    async fn test_generate_reply_with_given_category() {
        let reply = pattern_only()
            .generate_reply("声音很大", Some("冰箱"))
            .await
            .unwrap();
        assert!(reply.contains("冰箱"));

        let reply = pattern_only().generate_reply("TV 坏了", None).await.unwrap();
        assert!(reply.contains("电视"));
    }

    #[tokio::test]
    async fn test_complete_fills_missing_fields() {
        let analyzer = pattern_only();

        let mut blank = NewComplaint::new("冰箱结霜", "u1", "", None);
        blank.complaint_category = None;
        let completed = analyzer.complete(blank).await.unwrap();
        assert_eq!(completed.complaint_category.as_deref(), Some("冰箱"));
        assert!(completed.reply.is_some());

        let mut keep_reply = NewComplaint::new("冰箱结霜", "u1", "", Some("已处理"));
        keep_reply.complaint_category = None;
        let completed = analyzer.complete(keep_reply).await.unwrap();
        assert_eq!(completed.reply.as_deref(), Some("已处理"));

        let given = NewComplaint::new("冰箱结霜", "u1", "其它", None);
        let completed = analyzer.complete(given).await.unwrap();
        assert_eq!(completed.complaint_category.as_deref(), Some("其它"));
        assert!(completed.reply.is_none());
    }

    #[tokio::test]
    async fn test_parse_query_without_model() {
        let analyzer = pattern_only();
        assert!(analyzer.parse_query("  ").await.unwrap().is_none());

        let filter = analyzer
            .parse_query("Complaint.user_id == '7'")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            filter,
            Filter::Compare {
                field: Field::UserId,
                op: CompareOp::Eq,
                value: Value::Text("7".into()),
            }
        );

        assert!(analyzer.parse_query("color:red").await.is_err());
    }

    #[tokio::test]
    async fn test_parse_query_with_model() {
        let analyzer = with_mock(MockBackend::new());
        let filter = analyzer.parse_query("噪音").await.unwrap().unwrap();
        assert_eq!(
            filter,
            Filter::Text {
                field: Field::Content,
                op: TextMatch::Contains,
                pattern: "噪音".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_model_calls_recorded() {
        let db = Database::in_memory().unwrap();
        let analyzer = with_mock(MockBackend::new()).with_metrics(db.clone());

        analyzer.analyze("电视没有声音").await.unwrap();
        analyzer.parse_query("声音").await.unwrap();

        let summary = db.ai_metric_summary().unwrap();
        let operations: Vec<&str> = summary.iter().map(|s| s.operation.as_str()).collect();
        assert_eq!(operations, vec!["classify", "parse_query", "reply"]);
        assert!(summary.iter().all(|s| s.total_calls == 1));
    }

    #[tokio::test]
    async fn test_failed_model_calls_recorded() {
        let db = Database::in_memory().unwrap();
        let analyzer = with_mock(MockBackend::failing()).with_metrics(db.clone());

        analyzer.classify("电视").await.unwrap();

        let metrics = db.list_ai_metrics(10).unwrap();
        assert_eq!(metrics.len(), 1);
        assert!(!metrics[0].success);
        assert!(metrics[0].error_message.is_some());
        assert_eq!(metrics[0].model, "mock");
    }
}
