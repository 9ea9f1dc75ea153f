//! Domain models for Plaint

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Storage format for timestamps (matches SQLite's CURRENT_TIMESTAMP)
pub const DB_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// User id recorded when a complaint arrives without one
pub const ANONYMOUS_USER: &str = "anonymous";

/// A stored customer complaint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: i64,
    pub complaint_time: NaiveDateTime,
    pub content: String,
    pub user_id: String,
    pub complaint_category: String,
    pub reply: Option<String>,
}

/// A complaint to be created, or the full replacement of an existing one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComplaint {
    #[serde(default = "now", deserialize_with = "timestamp::deserialize")]
    pub complaint_time: NaiveDateTime,
    pub content: String,
    #[serde(default = "anonymous")]
    pub user_id: String,
    /// Left empty on intake to let the analyzer classify the text
    #[serde(default)]
    pub complaint_category: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
}

impl NewComplaint {
    /// Build a complaint stamped with the current time
    pub fn new(content: &str, user_id: &str, category: &str, reply: Option<&str>) -> Self {
        Self {
            complaint_time: now(),
            content: content.to_string(),
            user_id: user_id.to_string(),
            complaint_category: Some(category.to_string()),
            reply: reply.map(str::to_string),
        }
    }

    /// Whether a category was supplied; blank text counts as missing
    pub fn has_category(&self) -> bool {
        self.complaint_category
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }
}

/// Partial update; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplaintPatch {
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub complaint_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub complaint_category: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
}

impl ComplaintPatch {
    pub fn is_empty(&self) -> bool {
        self.complaint_time.is_none()
            && self.content.is_none()
            && self.user_id.is_none()
            && self.complaint_category.is_none()
            && self.reply.is_none()
    }
}

/// How a category was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    /// The language model answered
    Llm,
    /// A classifier pattern matched
    Pattern,
    /// Nothing matched, the profile's fallback category was used
    Fallback,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Pattern => "pattern",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of analyzing a complaint text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub category: String,
    pub reply: String,
    pub source: AnalysisSource,
    /// Set when the analyzed complaint was persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complaint_id: Option<i64>,
}

/// Number of complaints in a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// Category statistics over all complaints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total: i64,
    pub categories: Vec<CategoryCount>,
}

impl Statistics {
    pub fn from_counts(categories: Vec<CategoryCount>) -> Self {
        let total = categories.iter().map(|c| c.count).sum();
        Self { total, categories }
    }
}

/// Kind of language model call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiOperation {
    Classify,
    Reply,
    ParseQuery,
}

impl AiOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Reply => "reply",
            Self::ParseQuery => "parse_query",
        }
    }
}

impl std::str::FromStr for AiOperation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "classify" => Ok(Self::Classify),
            "reply" => Ok(Self::Reply),
            "parse_query" => Ok(Self::ParseQuery),
            _ => Err(format!("Unknown AI operation: {}", s)),
        }
    }
}

impl std::fmt::Display for AiOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A model call to record
#[derive(Debug, Clone)]
pub struct NewAiMetric {
    pub operation: AiOperation,
    pub model: String,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub input_text: Option<String>,
    pub result_text: Option<String>,
}

/// A recorded model call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMetric {
    pub id: i64,
    pub operation: String,
    pub model: String,
    pub started_at: NaiveDateTime,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub input_text: Option<String>,
    pub result_text: Option<String>,
}

/// Aggregated model call statistics for one operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiOperationStats {
    pub operation: String,
    pub total_calls: i64,
    pub successful_calls: i64,
    pub avg_latency_ms: f64,
}

impl AiOperationStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

fn now() -> NaiveDateTime {
    current_time()
}

fn anonymous() -> String {
    ANONYMOUS_USER.to_string()
}

/// Local wall-clock time truncated to whole seconds (storage precision)
pub fn current_time() -> NaiveDateTime {
    let now = Local::now().naive_local();
    parse_timestamp(&now.format(DB_TIME_FORMAT).to_string()).unwrap_or(now)
}

/// Parse a timestamp in any accepted input format
///
/// Accepts RFC 3339 (converted to UTC), naive ISO 8601 with optional
/// fractional seconds, SQLite style `YYYY-MM-DD HH:MM:SS`, and a bare date
/// (midnight).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", DB_TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Serde helpers for the flexible timestamp input formats
pub mod timestamp {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_timestamp(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s)))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => parse_timestamp(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDateTime::parse_from_str("2024-01-01 08:30:00", DB_TIME_FORMAT).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T08:30:00.000Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T10:30:00+02:00"), Some(expected));
        assert!(parse_timestamp("2024-01-01").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_new_complaint_defaults() {
        let json = r#"{"content": "电视没有声音"}"#;
        let complaint: NewComplaint = serde_json::from_str(json).unwrap();
        assert_eq!(complaint.user_id, ANONYMOUS_USER);
        assert!(complaint.complaint_category.is_none());
        assert!(complaint.reply.is_none());
    }

    #[test]
    fn test_new_complaint_rejects_bad_time() {
        let json = r#"{"content": "x", "complaint_time": "not a time"}"#;
        assert!(serde_json::from_str::<NewComplaint>(json).is_err());
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(ComplaintPatch::default().is_empty());
        let patch = ComplaintPatch {
            reply: Some("已处理".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_statistics_total() {
        let stats = Statistics::from_counts(vec![
            CategoryCount {
                category: "电视".into(),
                count: 3,
            },
            CategoryCount {
                category: "冰箱".into(),
                count: 2,
            },
        ]);
        assert_eq!(stats.total, 5);
    }
}
