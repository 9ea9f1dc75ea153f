//! Language model call metrics

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{AiMetric, AiOperationStats, NewAiMetric};

/// Longest input/result text kept per metric row
const MAX_TEXT_LEN: usize = 2000;

fn truncate(text: &Option<String>) -> Option<String> {
    text.as_ref()
        .map(|t| t.chars().take(MAX_TEXT_LEN).collect::<String>())
}

impl Database {
    /// Record a model call metric
    pub fn record_ai_metric(&self, metric: &NewAiMetric) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO ai_metrics (
                operation, model, latency_ms, success, error_message, input_text, result_text
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                metric.operation.as_str(),
                metric.model,
                metric.latency_ms,
                metric.success,
                metric.error_message,
                truncate(&metric.input_text),
                truncate(&metric.result_text),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Per-operation call counts, success counts and mean latency
    pub fn ai_metric_summary(&self) -> Result<Vec<AiOperationStats>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT
                operation,
                COUNT(*) as total_calls,
                SUM(CASE WHEN success THEN 1 ELSE 0 END) as successful_calls,
                COALESCE(AVG(latency_ms), 0) as avg_latency
            FROM ai_metrics
            GROUP BY operation
            ORDER BY operation
            "#,
        )?;

        let stats = stmt
            .query_map([], |row| {
                Ok(AiOperationStats {
                    operation: row.get(0)?,
                    total_calls: row.get(1)?,
                    successful_calls: row.get(2)?,
                    avg_latency_ms: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(stats)
    }

    /// Most recent model calls, newest first
    pub fn list_ai_metrics(&self, limit: i64) -> Result<Vec<AiMetric>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, operation, model, started_at, latency_ms, success,
                   error_message, input_text, result_text
            FROM ai_metrics
            ORDER BY id DESC
            LIMIT ?
            "#,
        )?;

        let metrics = stmt
            .query_map(params![limit], |row| {
                let started_at: String = row.get(3)?;
                Ok(AiMetric {
                    id: row.get(0)?,
                    operation: row.get(1)?,
                    model: row.get(2)?,
                    started_at: parse_datetime(&started_at),
                    latency_ms: row.get(4)?,
                    success: row.get(5)?,
                    error_message: row.get(6)?,
                    input_text: row.get(7)?,
                    result_text: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(metrics)
    }
}
