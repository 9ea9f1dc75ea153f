//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_profile` - Resolve the category profile from flags or environment
//! - `build_analyzer` - Analyzer with the configured language model
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use plaint_core::ai::{AIBackend, AIClient};
use plaint_core::{db::Database, ComplaintAnalyzer, PatternClassifier, Profile};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Profile from `--profile-path`, then `--profile`, then the environment
pub fn load_profile(name: Option<&str>, path: Option<&Path>) -> Result<Profile> {
    if let Some(path) = path {
        return Profile::from_file(path)
            .with_context(|| format!("Failed to load profile {}", path.display()));
    }
    if let Some(name) = name {
        return Profile::builtin(name).with_context(|| format!("Unknown profile '{}'", name));
    }
    Profile::from_env().context("Failed to load profile")
}

/// Analyzer for `profile`, using the model configured in the environment
///
/// Model calls are recorded in `db` when one is given.
pub fn build_analyzer(profile: Profile, db: Option<&Database>) -> Result<ComplaintAnalyzer> {
    let classifier = PatternClassifier::new(profile).context("Invalid category profile")?;
    let analyzer = ComplaintAnalyzer::new(classifier).with_ai(AIClient::from_env());
    Ok(match db {
        Some(db) => analyzer.with_metrics(db.clone()),
        None => analyzer,
    })
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool, profile: &Profile) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if db.is_encrypted() {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED");
    }

    println!(
        "   📋 Profile: {} ({})",
        profile.name,
        profile.all_category_names().join(", ")
    );

    match AIClient::from_env() {
        Some(client) => println!(
            "   🤖 AI backend: {} (model: {})",
            client.backend_name(),
            client.model()
        ),
        None => println!("   💡 Tip: Set OPENAI_COMPATIBLE_HOST or OLLAMA_HOST for model-backed analysis"),
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Import complaints: plaint import --file complaints.json");
    println!("  2. Or generate demo data: plaint simulate --count 50");
    println!("  3. Start web UI: plaint serve");

    Ok(())
}
