//! Complaint database operations

use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{format_datetime, parse_datetime, ComplaintFilter, Database};
use crate::error::{Error, Result};
use crate::models::{CategoryCount, Complaint, ComplaintPatch, NewComplaint};
use crate::query::Filter;

const COMPLAINT_COLUMNS: &str = "id, complaint_time, content, user_id, complaint_category, reply";

/// Deduplication hash for bulk-imported complaints
pub fn import_hash(complaint: &NewComplaint) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format_datetime(&complaint.complaint_time).as_bytes());
    hasher.update(b"|");
    hasher.update(complaint.user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(complaint.content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of inserting an import batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportInsertResult {
    pub imported: usize,
    pub duplicates: usize,
}

/// Validate a complaint for storage, returning its category
fn validated_category(complaint: &NewComplaint) -> Result<&str> {
    if complaint.content.trim().is_empty() {
        return Err(Error::InvalidData("content must not be empty".into()));
    }
    complaint
        .complaint_category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::InvalidData("complaint_category is required".into()))
}

impl Database {
    /// Create a complaint; the category must already be decided
    pub fn create_complaint(&self, complaint: &NewComplaint) -> Result<Complaint> {
        let category = validated_category(complaint)?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO complaints (complaint_time, content, user_id, complaint_category, reply)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                format_datetime(&complaint.complaint_time),
                complaint.content,
                complaint.user_id,
                category,
                complaint.reply,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(id, category, "Created complaint");

        Ok(Complaint {
            id,
            complaint_time: complaint.complaint_time,
            content: complaint.content.clone(),
            user_id: complaint.user_id.clone(),
            complaint_category: category.to_string(),
            reply: complaint.reply.clone(),
        })
    }

    /// Create several complaints in one transaction
    pub fn create_complaints(&self, complaints: &[NewComplaint]) -> Result<Vec<Complaint>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut created = Vec::with_capacity(complaints.len());

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO complaints (complaint_time, content, user_id, complaint_category, reply)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )?;
            for complaint in complaints {
                let category = validated_category(complaint)?;
                stmt.execute(params![
                    format_datetime(&complaint.complaint_time),
                    complaint.content,
                    complaint.user_id,
                    category,
                    complaint.reply,
                ])?;
                created.push(Complaint {
                    id: tx.last_insert_rowid(),
                    complaint_time: complaint.complaint_time,
                    content: complaint.content.clone(),
                    user_id: complaint.user_id.clone(),
                    complaint_category: category.to_string(),
                    reply: complaint.reply.clone(),
                });
            }
        }

        tx.commit()?;
        Ok(created)
    }

    /// Insert imported complaints, skipping ones already imported
    pub fn insert_imported_complaints(
        &self,
        complaints: &[NewComplaint],
    ) -> Result<ImportInsertResult> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut result = ImportInsertResult::default();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR IGNORE INTO complaints
                    (complaint_time, content, user_id, complaint_category, reply, import_hash)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for complaint in complaints {
                let category = validated_category(complaint)?;
                let changed = stmt.execute(params![
                    format_datetime(&complaint.complaint_time),
                    complaint.content,
                    complaint.user_id,
                    category,
                    complaint.reply,
                    import_hash(complaint),
                ])?;
                if changed > 0 {
                    result.imported += 1;
                } else {
                    result.duplicates += 1;
                }
            }
        }

        tx.commit()?;
        Ok(result)
    }

    /// Whether a complaint with this import hash is already stored
    pub fn import_hash_exists(&self, hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM complaints WHERE import_hash = ?)",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Get a complaint by ID
    pub fn get_complaint(&self, id: i64) -> Result<Option<Complaint>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM complaints WHERE id = ?", COMPLAINT_COLUMNS);

        let complaint = conn
            .query_row(&sql, params![id], Self::row_to_complaint)
            .optional()?;
        Ok(complaint)
    }

    /// List complaints matching an optional filter, ordered by id
    pub fn list_complaints(
        &self,
        filter: Option<&Filter>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Complaint>> {
        self.search_complaints(ComplaintFilter::new().expression(filter), skip, limit)
    }

    /// List complaints matching a filter builder, ordered by id
    pub fn search_complaints(
        &self,
        filter: ComplaintFilter<'_>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Complaint>> {
        let conn = self.conn()?;
        let filter = filter.build();

        let sql = format!(
            "SELECT {} FROM complaints {} ORDER BY id ASC LIMIT ? OFFSET ?",
            COMPLAINT_COLUMNS, filter.where_clause
        );

        let limit = limit.max(0);
        let skip = skip.max(0);
        let mut params_refs = filter.params_refs();
        params_refs.push(&limit);
        params_refs.push(&skip);

        let mut stmt = conn.prepare(&sql)?;
        let complaints = stmt
            .query_map(params_refs.as_slice(), Self::row_to_complaint)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(complaints)
    }

    /// Count complaints matching an optional filter
    pub fn count_complaints(&self, filter: Option<&Filter>) -> Result<i64> {
        let conn = self.conn()?;
        let filter = ComplaintFilter::new().expression(filter).build();

        let sql = filter.build_count_query();
        let mut stmt = conn.prepare(&sql)?;
        let params_refs = filter.params_refs();

        let count: i64 = stmt.query_row(params_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    /// Replace every field of a complaint
    ///
    /// Returns `None` when no complaint has this ID.
    pub fn replace_complaint(&self, id: i64, complaint: &NewComplaint) -> Result<Option<Complaint>> {
        let category = validated_category(complaint)?;
        let conn = self.conn()?;

        let changed = conn.execute(
            r#"
            UPDATE complaints
            SET complaint_time = ?, content = ?, user_id = ?, complaint_category = ?, reply = ?
            WHERE id = ?
            "#,
            params![
                format_datetime(&complaint.complaint_time),
                complaint.content,
                complaint.user_id,
                category,
                complaint.reply,
                id,
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        Ok(Some(Complaint {
            id,
            complaint_time: complaint.complaint_time,
            content: complaint.content.clone(),
            user_id: complaint.user_id.clone(),
            complaint_category: category.to_string(),
            reply: complaint.reply.clone(),
        }))
    }

    /// Update the fields present in a patch
    ///
    /// Returns `false` when no complaint has this ID. An empty patch is an
    /// `InvalidData` error.
    pub fn update_complaint(&self, id: i64, patch: &ComplaintPatch) -> Result<bool> {
        if patch.is_empty() {
            return Err(Error::InvalidData("No fields to update".into()));
        }

        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(time) = patch.complaint_time {
            sets.push("complaint_time = ?");
            values.push(Box::new(format_datetime(&time)));
        }
        if let Some(ref content) = patch.content {
            if content.trim().is_empty() {
                return Err(Error::InvalidData("content must not be empty".into()));
            }
            sets.push("content = ?");
            values.push(Box::new(content.clone()));
        }
        if let Some(ref user_id) = patch.user_id {
            sets.push("user_id = ?");
            values.push(Box::new(user_id.clone()));
        }
        if let Some(ref category) = patch.complaint_category {
            if category.trim().is_empty() {
                return Err(Error::InvalidData("complaint_category must not be empty".into()));
            }
            sets.push("complaint_category = ?");
            values.push(Box::new(category.trim().to_string()));
        }
        if let Some(ref reply) = patch.reply {
            sets.push("reply = ?");
            values.push(Box::new(reply.clone()));
        }
        values.push(Box::new(id));

        let conn = self.conn()?;
        let sql = format!("UPDATE complaints SET {} WHERE id = ?", sets.join(", "));
        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, params_refs.as_slice())?;

        Ok(changed > 0)
    }

    /// Delete a complaint; `false` when it did not exist
    pub fn delete_complaint(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM complaints WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    /// Complaint counts per category, largest first
    pub fn category_statistics(&self) -> Result<Vec<CategoryCount>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT complaint_category, COUNT(*) AS count
            FROM complaints
            GROUP BY complaint_category
            ORDER BY count DESC, complaint_category ASC
            "#,
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    category: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(counts)
    }

    /// Helper to convert a row to Complaint
    /// Column order: id, complaint_time, content, user_id, complaint_category, reply
    pub(crate) fn row_to_complaint(row: &rusqlite::Row) -> rusqlite::Result<Complaint> {
        let time_str: String = row.get(1)?;
        Ok(Complaint {
            id: row.get(0)?,
            complaint_time: parse_datetime(&time_str),
            content: row.get(2)?,
            user_id: row.get(3)?,
            complaint_category: row.get(4)?,
            reply: row.get(5)?,
        })
    }
}
