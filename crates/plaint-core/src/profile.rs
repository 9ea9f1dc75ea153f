//! Classifier profiles
//!
//! A profile names the fixed set of product categories a deployment sorts
//! complaints into, the regex patterns that recognize each one, the canned
//! reply for each, and the data the simulator draws from.
//!
//! ## Resolution
//!
//! 1. `PLAINT_PROFILE_PATH`: a TOML file on disk
//! 2. `PLAINT_PROFILE`: name of a built-in profile
//! 3. The built-in `appliances` profile

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded built-in profiles (compiled into binary)
mod builtin {
    pub const APPLIANCES: &str = include_str!("../../../config/profiles/appliances.toml");
    pub const TELECOM: &str = include_str!("../../../config/profiles/telecom.toml");
}

/// Name of the profile used when nothing is configured
pub const DEFAULT_PROFILE: &str = "appliances";

/// Environment variable selecting a built-in profile by name
pub const PROFILE_ENV: &str = "PLAINT_PROFILE";

/// Environment variable pointing at a profile TOML file
pub const PROFILE_PATH_ENV: &str = "PLAINT_PROFILE_PATH";

/// A product category recognized by the classifier
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    /// Regular expressions, matched case-insensitively anywhere in the text
    pub patterns: Vec<String>,
    /// Canned reply used when no language model writes one
    pub reply: String,
    /// Problem phrases for simulated complaints
    #[serde(default)]
    pub problems: Vec<String>,
}

/// The catch-all category for text no pattern recognizes
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackCategory {
    pub name: String,
    pub reply: String,
    #[serde(default)]
    pub problems: Vec<String>,
}

/// Extra data for the demo-data simulator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulationData {
    /// Replies a simulated complaint may already carry
    #[serde(default)]
    pub replies: Vec<String>,
}

/// A complete classifier profile
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fallback: FallbackCategory,
    pub categories: Vec<CategoryDef>,
    #[serde(default)]
    pub simulation: SimulationData,
}

impl Profile {
    /// Names of all built-in profiles
    pub fn builtin_names() -> &'static [&'static str] {
        &["appliances", "telecom"]
    }

    /// Load a built-in profile by name
    pub fn builtin(name: &str) -> Result<Self> {
        let content = match name.to_lowercase().as_str() {
            "appliances" | "appliance" => builtin::APPLIANCES,
            "telecom" => builtin::TELECOM,
            other => {
                return Err(Error::Profile(format!(
                    "Unknown profile '{}' (built-in: {})",
                    other,
                    Self::builtin_names().join(", ")
                )))
            }
        };
        Self::from_toml(content)
    }

    /// Load a profile from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let profile = Self::from_toml(&content)?;
        debug!(path = %path.display(), name = %profile.name, "Loaded profile from file");
        Ok(profile)
    }

    /// Parse and validate a profile from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(content)
            .map_err(|e| Error::Profile(format!("Invalid profile TOML: {}", e)))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Resolve the profile from the environment
    pub fn from_env() -> Result<Self> {
        if let Some(path) = std::env::var(PROFILE_PATH_ENV).ok().filter(|s| !s.is_empty()) {
            return Self::from_file(Path::new(&path));
        }
        let name = std::env::var(PROFILE_ENV).unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
        Self::builtin(&name)
    }

    /// Category names in classification order (fallback excluded)
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }

    /// Category names with the fallback appended
    pub fn all_category_names(&self) -> Vec<&str> {
        let mut names = self.category_names();
        names.push(self.fallback.name.as_str());
        names
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Profile("Profile name must not be empty".into()));
        }
        if self.categories.is_empty() {
            return Err(Error::Profile(format!(
                "Profile '{}' defines no categories",
                self.name
            )));
        }
        if self.fallback.name.trim().is_empty() {
            return Err(Error::Profile("Fallback category name must not be empty".into()));
        }

        let mut seen = HashSet::new();
        seen.insert(self.fallback.name.as_str());
        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(Error::Profile("Category name must not be empty".into()));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(Error::Profile(format!(
                    "Duplicate category '{}'",
                    category.name
                )));
            }
            if category.patterns.is_empty() {
                return Err(Error::Profile(format!(
                    "Category '{}' has no patterns",
                    category.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_parse() {
        for name in Profile::builtin_names() {
            let profile = Profile::builtin(name).unwrap();
            assert_eq!(&profile.name, name);
            assert!(!profile.categories.is_empty());
        }
    }

    #[test]
    fn test_appliances_profile() {
        let profile = Profile::builtin("appliances").unwrap();
        assert_eq!(profile.category_names(), vec!["电视", "冰箱", "洗衣机"]);
        assert_eq!(profile.fallback.name, "未知");
        assert_eq!(profile.fallback.reply, "感谢您的反馈，我们将尽快处理您的问题。");
        assert_eq!(profile.all_category_names().len(), 4);
    }

    #[test]
    fn test_unknown_builtin() {
        let err = Profile::builtin("bakery").unwrap_err();
        assert!(err.to_string().contains("bakery"));
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let content = r#"
name = "dup"
[fallback]
name = "other"
reply = "ok"

[[categories]]
name = "a"
patterns = ["a"]
reply = "a"

[[categories]]
name = "a"
patterns = ["b"]
reply = "b"
"#;
        let err = Profile::from_toml(content).unwrap_err();
        assert!(err.to_string().contains("Duplicate category"));
    }

    #[test]
    fn test_category_without_patterns_rejected() {
        let content = r#"
name = "empty"
[fallback]
name = "other"
reply = "ok"

[[categories]]
name = "a"
patterns = []
reply = "a"
"#;
        assert!(Profile::from_toml(content).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
name = "custom"
[fallback]
name = "misc"
reply = "We will look into it."

[[categories]]
name = "printer"
patterns = ["printer", "toner"]
reply = "A technician will contact you about your printer."
"#,
        )
        .unwrap();

        let profile = Profile::from_file(&path).unwrap();
        assert_eq!(profile.name, "custom");
        assert_eq!(profile.category_names(), vec!["printer"]);
        assert!(profile.simulation.replies.is_empty());
    }
}
