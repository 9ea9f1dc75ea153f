//! Bulk complaint import from JSON or CSV exports
//!
//! Records are cleaned before insertion: strings are trimmed, unparseable
//! timestamps and blank content are skipped, missing categories are filled by
//! the analyzer. Each imported row carries an import hash so running the same
//! file twice adds nothing.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::analyzer::ComplaintAnalyzer;
use crate::db::{import_hash, Database};
use crate::error::{Error, Result};
use crate::models::{current_time, parse_timestamp, NewComplaint, ANONYMOUS_USER};

/// Input file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Csv,
}

impl ImportFormat {
    /// Pick the format from the file extension (JSON unless `.csv`)
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }
}

/// A complaint record as found in an export, before cleaning
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawComplaint {
    #[serde(default, deserialize_with = "lenient_string")]
    pub complaint_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, alias = "product_category", deserialize_with = "lenient_string")]
    pub complaint_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reply: Option<String>,
}

/// Accept strings, numbers and null for any text column
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    /// Records read from the input
    pub read: usize,
    /// Rows inserted
    pub imported: usize,
    /// Records dropped during cleaning
    pub skipped_invalid: usize,
    /// Records already present from an earlier import
    pub skipped_duplicate: usize,
    /// Records whose category came from the analyzer
    pub classified: usize,
}

/// Parse a JSON array of complaint records
pub fn parse_json<R: Read>(reader: R) -> Result<Vec<RawComplaint>> {
    let value: Value = serde_json::from_reader(reader)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(Error::from))
            .collect(),
        _ => Err(Error::Import(
            "Expected a JSON array of complaint records".into(),
        )),
    }
}

/// Parse CSV with a header row naming the complaint columns
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<RawComplaint>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: RawComplaint = result?;
        records.push(record);
    }
    Ok(records)
}

/// Parse records from any reader in the given format
pub fn parse_records<R: Read>(reader: R, format: ImportFormat) -> Result<Vec<RawComplaint>> {
    match format {
        ImportFormat::Json => parse_json(reader),
        ImportFormat::Csv => parse_csv(reader),
    }
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Clean one raw record
///
/// Missing time means `now`; a blank user becomes anonymous; a blank
/// category is left unset for the analyzer. Unparseable times and blank
/// content are `Import` errors.
pub fn clean_record(raw: &RawComplaint, now: NaiveDateTime) -> Result<NewComplaint> {
    let complaint_time = match trimmed(&raw.complaint_time) {
        Some(text) => parse_timestamp(text)
            .ok_or_else(|| Error::Import(format!("Invalid complaint_time: {}", text)))?,
        None => now,
    };

    let content = trimmed(&raw.content)
        .ok_or_else(|| Error::Import("Empty complaint content".into()))?;

    Ok(NewComplaint {
        complaint_time,
        content: content.to_string(),
        user_id: trimmed(&raw.user_id)
            .unwrap_or(ANONYMOUS_USER)
            .to_string(),
        complaint_category: trimmed(&raw.complaint_category).map(str::to_string),
        reply: trimmed(&raw.reply).map(str::to_string),
    })
}

/// Clean, classify and insert records
pub async fn import_records(
    db: &Database,
    analyzer: &ComplaintAnalyzer,
    records: &[RawComplaint],
) -> Result<ImportStats> {
    let now = current_time();
    let mut stats = ImportStats {
        read: records.len(),
        ..Default::default()
    };

    let mut ready = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();
    for (index, raw) in records.iter().enumerate() {
        let complaint = match clean_record(raw, now) {
            Ok(c) => c,
            Err(e) => {
                error!("Skipping record {}: {}", index + 1, e);
                stats.skipped_invalid += 1;
                continue;
            }
        };

        // Known records are dropped before they cost a model call
        let hash = import_hash(&complaint);
        if !seen.insert(hash.clone()) || db.import_hash_exists(&hash)? {
            stats.skipped_duplicate += 1;
            continue;
        }

        let complaint = if !complaint.has_category() {
            stats.classified += 1;
            analyzer.complete(complaint).await?
        } else {
            complaint
        };
        ready.push(complaint);
    }

    debug!("{} records ready after cleaning", ready.len());

    let inserted = db.insert_imported_complaints(&ready)?;
    stats.imported = inserted.imported;
    stats.skipped_duplicate += inserted.duplicates;

    info!(
        "Import finished: {} read, {} imported, {} invalid, {} duplicate, {} classified",
        stats.read, stats.imported, stats.skipped_invalid, stats.skipped_duplicate, stats.classified
    );

    Ok(stats)
}

/// Import a JSON or CSV file (format from the extension)
pub async fn import_file(
    db: &Database,
    analyzer: &ComplaintAnalyzer,
    path: &Path,
) -> Result<ImportStats> {
    let file = File::open(path)?;
    let records = parse_records(BufReader::new(file), ImportFormat::from_path(path))?;
    info!("Read {} records from {}", records.len(), path.display());
    import_records(db, analyzer, &records).await
}
