//! Pattern classifier for complaint text
//!
//! Categories are tried in profile order; the first category with a pattern
//! matching anywhere in the text wins. Text no pattern recognizes lands in
//! the profile's fallback category.

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::Result;
use crate::models::AnalysisSource;
use crate::profile::Profile;

/// Result of classifying a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub source: AnalysisSource,
}

/// A category with its compiled patterns
struct CompiledCategory {
    name: String,
    patterns: Vec<Regex>,
}

/// Regex classifier compiled from a profile
pub struct PatternClassifier {
    profile: Profile,
    compiled: Vec<CompiledCategory>,
}

impl PatternClassifier {
    /// Compile every pattern of the profile
    ///
    /// Fails on the first invalid regular expression.
    pub fn new(profile: Profile) -> Result<Self> {
        let mut compiled = Vec::with_capacity(profile.categories.len());
        for category in &profile.categories {
            let patterns = category
                .patterns
                .iter()
                .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            compiled.push(CompiledCategory {
                name: category.name.clone(),
                patterns,
            });
        }
        Ok(Self { profile, compiled })
    }

    /// Classifier for a built-in profile
    pub fn builtin(name: &str) -> Result<Self> {
        Self::new(Profile::builtin(name)?)
    }

    /// Classify a text
    pub fn classify(&self, text: &str) -> Classification {
        for category in &self.compiled {
            if category.patterns.iter().any(|re| re.is_match(text)) {
                debug!(category = %category.name, "Pattern matched");
                return Classification {
                    category: category.name.clone(),
                    source: AnalysisSource::Pattern,
                };
            }
        }
        Classification {
            category: self.profile.fallback.name.clone(),
            source: AnalysisSource::Fallback,
        }
    }

    /// Canned reply for a category; unknown categories get the fallback reply
    pub fn reply_for(&self, category: &str) -> &str {
        self.profile
            .categories
            .iter()
            .find(|c| c.name == category)
            .map(|c| c.reply.as_str())
            .unwrap_or(self.profile.fallback.reply.as_str())
    }

    /// Whether the category belongs to the profile (fallback included)
    pub fn is_known(&self, category: &str) -> bool {
        category == self.profile.fallback.name
            || self.profile.categories.iter().any(|c| c.name == category)
    }

    /// Category names in classification order (fallback excluded)
    pub fn category_names(&self) -> Vec<&str> {
        self.profile.category_names()
    }

    /// The fallback category name
    pub fn fallback(&self) -> &str {
        &self.profile.fallback.name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appliances() -> PatternClassifier {
        PatternClassifier::builtin("appliances").unwrap()
    }

    #[test]
    fn test_classify_chinese_keywords() {
        let classifier = appliances();
        assert_eq!(classifier.classify("冰箱不制冷").category, "冰箱");
        assert_eq!(classifier.classify("洗衣机漏水").category, "洗衣机");
        assert_eq!(classifier.classify("电视屏幕出现条纹").category, "电视");
    }

    #[test]
    fn test_classify_case_insensitive() {
        let classifier = appliances();
        let result = classifier.classify("My FRIDGE is making noise");
        assert_eq!(result.category, "冰箱");
        assert_eq!(result.source, AnalysisSource::Pattern);

        assert_eq!(classifier.classify("the Washing Machine broke").category, "洗衣机");
    }

    #[test]
    fn test_classify_fallback() {
        let classifier = appliances();
        let result = classifier.classify("未知产品问题");
        assert_eq!(result.category, "未知");
        assert_eq!(result.source, AnalysisSource::Fallback);
    }

    #[test]
    fn test_profile_order_wins() {
        // Mentions both; 电视 comes first in the profile
        let classifier = appliances();
        assert_eq!(classifier.classify("冰箱旁边的电视坏了").category, "电视");
    }

    #[test]
    fn test_reply_for() {
        let classifier = appliances();
        assert!(classifier.reply_for("电视").contains("电视"));
        assert_eq!(
            classifier.reply_for("未知"),
            "感谢您的反馈，我们将尽快处理您的问题。"
        );
        assert_eq!(
            classifier.reply_for("electronics"),
            "感谢您的反馈，我们将尽快处理您的问题。"
        );
    }

    #[test]
    fn test_is_known() {
        let classifier = appliances();
        assert!(classifier.is_known("冰箱"));
        assert!(classifier.is_known("未知"));
        assert!(!classifier.is_known("手机"));
    }

    #[test]
    fn test_telecom_profile() {
        let classifier = PatternClassifier::builtin("telecom").unwrap();
        assert_eq!(classifier.classify("家里宽带频繁掉线").category, "宽带");
        assert_eq!(classifier.classify("my smartphone has no signal").category, "手机");
        assert_eq!(classifier.classify("账单金额有误").category, "其它");
    }

    #[test]
    fn test_invalid_pattern() {
        let profile = Profile::from_toml(
            r#"
name = "broken"
[fallback]
name = "other"
reply = "ok"

[[categories]]
name = "a"
patterns = ["(unclosed"]
reply = "a"
"#,
        )
        .unwrap();
        assert!(PatternClassifier::new(profile).is_err());
    }
}
