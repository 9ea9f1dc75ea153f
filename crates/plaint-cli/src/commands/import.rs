//! Import command implementation

use std::path::Path;

use anyhow::{Context, Result};
use plaint_core::import::{import_file, ImportFormat};
use plaint_core::{db::Database, ComplaintAnalyzer};

pub async fn cmd_import(db: &Database, analyzer: &ComplaintAnalyzer, file: &Path) -> Result<()> {
    let format = match ImportFormat::from_path(file) {
        ImportFormat::Json => "JSON",
        ImportFormat::Csv => "CSV",
    };
    println!("📥 Importing {} from {}...", format, file.display());

    let stats = import_file(db, analyzer, file)
        .await
        .with_context(|| format!("Failed to import {}", file.display()))?;

    db.log_audit(
        "cli",
        "import",
        Some("complaint"),
        None,
        Some(&format!(
            "file={}, imported={}, duplicates={}, invalid={}",
            file.display(),
            stats.imported,
            stats.skipped_duplicate,
            stats.skipped_invalid
        )),
    )?;

    println!("   Records read: {}", stats.read);
    println!("   ✅ Imported: {}", stats.imported);
    if stats.classified > 0 {
        println!("   🤖 Classified: {}", stats.classified);
    }
    if stats.skipped_duplicate > 0 {
        println!("   ⏭️  Skipped (already imported): {}", stats.skipped_duplicate);
    }
    if stats.skipped_invalid > 0 {
        println!("   ⚠️  Skipped (invalid): {}", stats.skipped_invalid);
    }

    Ok(())
}
