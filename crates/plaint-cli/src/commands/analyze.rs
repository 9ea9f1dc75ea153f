//! Analyze and simulate command implementations

use anyhow::{bail, Result};
use plaint_core::models::{current_time, NewComplaint, ANONYMOUS_USER};
use plaint_core::simulate::{self, MAX_SIMULATED};
use plaint_core::{db::Database, ComplaintAnalyzer, Profile};

use super::truncate;

/// Classify a text and print the reply; store it when `db` is given
pub async fn cmd_analyze(
    analyzer: &ComplaintAnalyzer,
    db: Option<&Database>,
    text: &str,
    user: Option<&str>,
) -> Result<()> {
    let analysis = analyzer.analyze(text).await?;

    println!();
    println!("🔍 Analysis");
    println!("   ─────────────────────────────");
    println!("   Category: {} ({})", analysis.category, analysis.source);
    println!("   Reply:    {}", analysis.reply);

    if let Some(db) = db {
        let complaint = db.create_complaint(&NewComplaint::new(
            text.trim(),
            user.map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or(ANONYMOUS_USER),
            &analysis.category,
            Some(&analysis.reply),
        ))?;
        println!();
        println!("✅ Saved as complaint #{}", complaint.id);
    }

    Ok(())
}

/// Generate demo complaints from the profile and store them
pub fn cmd_simulate(
    db: &Database,
    profile: &Profile,
    count: usize,
    seed: Option<u64>,
) -> Result<()> {
    if count == 0 || count > MAX_SIMULATED {
        bail!("--count must be between 1 and {}", MAX_SIMULATED);
    }

    println!("🎲 Generating {} complaints ({} profile)...", count, profile.name);

    let batch = simulate::generate_seeded(profile, count, current_time(), seed);
    let created = db.create_complaints(&batch)?;

    for complaint in created.iter().take(5) {
        println!(
            "   #{:<5} {:<8} {}",
            complaint.id,
            complaint.complaint_category,
            truncate(&complaint.content, 40)
        );
    }
    if created.len() > 5 {
        println!("   ... and {} more", created.len() - 5);
    }

    println!();
    println!("✅ Created {} complaints", created.len());

    Ok(())
}
