//! Complaint command implementations (list, show, delete, reply, stats)

use anyhow::{bail, Context, Result};
use plaint_core::models::{ComplaintPatch, Statistics};
use plaint_core::{db::Database, ComplaintAnalyzer};

use super::truncate;

pub async fn cmd_complaints_list(
    db: &Database,
    analyzer: &ComplaintAnalyzer,
    query: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<()> {
    let filter = analyzer
        .parse_query(query.unwrap_or_default())
        .await
        .context("Invalid query")?;
    let complaints = db.list_complaints(filter.as_ref(), skip.max(0), limit.clamp(1, 1000))?;
    let total = db.count_complaints(filter.as_ref())?;

    if complaints.is_empty() {
        println!("No complaints found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<19}  {:<12} {:<10}  {}",
        "ID", "TIME", "USER", "CATEGORY", "CONTENT"
    );
    println!("{}", "-".repeat(90));

    for c in &complaints {
        println!(
            "{:<6} {:<19}  {:<12} {:<10}  {}",
            c.id,
            c.complaint_time.format("%Y-%m-%d %H:%M:%S"),
            truncate(&c.user_id, 12),
            c.complaint_category,
            truncate(&c.content, 40)
        );
    }

    println!();
    println!("Showing {} of {} complaints", complaints.len(), total);

    Ok(())
}

pub fn cmd_complaints_show(db: &Database, id: i64) -> Result<()> {
    let Some(c) = db.get_complaint(id)? else {
        bail!("Complaint {} not found", id);
    };

    println!();
    println!("📝 Complaint #{}", c.id);
    println!("   ─────────────────────────────");
    println!("   Time:     {}", c.complaint_time.format("%Y-%m-%d %H:%M:%S"));
    println!("   User:     {}", c.user_id);
    println!("   Category: {}", c.complaint_category);
    println!("   Content:  {}", c.content);
    println!("   Reply:    {}", c.reply.as_deref().unwrap_or("(none)"));

    Ok(())
}

pub fn cmd_complaints_delete(db: &Database, id: i64) -> Result<()> {
    if !db.delete_complaint(id)? {
        bail!("Complaint {} not found", id);
    }
    db.log_audit("cli", "delete", Some("complaint"), Some(id), None)?;

    println!("🗑️  Deleted complaint #{}", id);
    Ok(())
}

pub fn cmd_complaints_reply(db: &Database, id: i64, text: &str) -> Result<()> {
    let patch = ComplaintPatch {
        reply: Some(text.to_string()),
        ..Default::default()
    };
    if !db.update_complaint(id, &patch)? {
        bail!("Complaint {} not found", id);
    }
    db.log_audit("cli", "update", Some("complaint"), Some(id), Some("fields=reply"))?;

    println!("✅ Reply saved for complaint #{}", id);
    Ok(())
}

pub fn cmd_stats(db: &Database) -> Result<()> {
    let stats = Statistics::from_counts(db.category_statistics()?);

    println!();
    println!("📊 Complaint Statistics");
    println!("   ─────────────────────────────");

    if stats.total == 0 {
        println!("   No complaints yet.");
        return Ok(());
    }

    for c in &stats.categories {
        let share = c.count as f64 * 100.0 / stats.total as f64;
        println!("   {:<10} {:>6}  ({:>5.1}%)", c.category, c.count, share);
    }
    println!("   ─────────────────────────────");
    println!("   {:<10} {:>6}", "Total", stats.total);

    Ok(())
}
