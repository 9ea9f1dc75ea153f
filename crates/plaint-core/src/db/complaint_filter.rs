//! Complaint filter builder for constructing dynamic SQL queries
//!
//! Compiles a parsed [`Filter`] tree, plus the plain category and user
//! filters the CLI exposes, into a WHERE clause with positional parameters.
//! Column names come from the closed [`crate::query::Field`] enum; every literal is bound.

use super::format_datetime;
use crate::query::{Filter, TextMatch, Value};

/// Builder for complaint query filters
#[derive(Default)]
pub struct ComplaintFilter<'query> {
    pub expression: Option<&'query Filter>,
    pub category: Option<&'query str>,
    pub user_id: Option<&'query str>,
}

/// Result of building a filter
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> ComplaintFilter<'query> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parsed query expression
    pub fn expression(mut self, filter: Option<&'query Filter>) -> Self {
        self.expression = filter;
        self
    }

    /// Set exact category filter
    pub fn category(mut self, category: Option<&'query str>) -> Self {
        self.category = category;
        self
    }

    /// Set exact user filter
    pub fn user_id(mut self, user_id: Option<&'query str>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(filter) = self.expression {
            let mut sql = String::new();
            write_filter(filter, &mut sql, &mut params);
            conditions.push(sql);
        }

        if let Some(category) = self.category.map(str::trim).filter(|c| !c.is_empty()) {
            conditions.push("complaint_category = ?".to_string());
            params.push(Box::new(category.to_string()));
        }

        if let Some(user) = self.user_id.map(str::trim).filter(|u| !u.is_empty()) {
            conditions.push("user_id = ?".to_string());
            params.push(Box::new(user.to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        FilterResult {
            where_clause,
            params,
        }
    }
}

impl FilterResult {
    /// Build a COUNT query
    pub fn build_count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM complaints {}", self.where_clause)
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

fn write_filter(filter: &Filter, sql: &mut String, params: &mut Vec<Box<dyn rusqlite::ToSql>>) {
    match filter {
        Filter::And(items) => write_group(items, " AND ", "1 = 1", sql, params),
        Filter::Or(items) => write_group(items, " OR ", "1 = 0", sql, params),
        Filter::Not(inner) => {
            sql.push_str("NOT (");
            write_filter(inner, sql, params);
            sql.push(')');
        }
        Filter::Compare { field, op, value } => {
            sql.push_str(&format!("{} {} ?", field.column(), op.sql()));
            params.push(bind(value));
        }
        Filter::IsNull { field, negated } => {
            let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
            sql.push_str(&format!("{} {}", field.column(), test));
        }
        Filter::Text { field, op, pattern } => {
            let like = match op {
                TextMatch::Contains => format!("%{}%", escape_like(pattern)),
                TextMatch::StartsWith => format!("{}%", escape_like(pattern)),
                TextMatch::EndsWith => format!("%{}", escape_like(pattern)),
                TextMatch::Like => pattern.clone(),
            };
            if *op == TextMatch::Like {
                sql.push_str(&format!("{} LIKE ?", field.column()));
            } else {
                sql.push_str(&format!("{} LIKE ? ESCAPE '\\'", field.column()));
            }
            params.push(Box::new(like));
        }
        Filter::In {
            field,
            values,
            negated,
        } => {
            if values.is_empty() {
                // Membership in an empty list is never true
                sql.push_str(if *negated { "1 = 1" } else { "1 = 0" });
                return;
            }
            let placeholders: Vec<&str> = values.iter().map(|_| "?").collect();
            let keyword = if *negated { "NOT IN" } else { "IN" };
            sql.push_str(&format!(
                "{} {} ({})",
                field.column(),
                keyword,
                placeholders.join(", ")
            ));
            for value in values {
                params.push(bind(value));
            }
        }
    }
}

fn write_group(
    items: &[Filter],
    separator: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
) {
    if items.is_empty() {
        sql.push_str(empty);
        return;
    }
    sql.push('(');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            sql.push_str(separator);
        }
        write_filter(item, sql, params);
    }
    sql.push(')');
}

fn bind(value: &Value) -> Box<dyn rusqlite::ToSql> {
    match value {
        Value::Integer(n) => Box::new(*n),
        Value::Text(s) => Box::new(s.clone()),
        Value::Time(t) => Box::new(format_datetime(t)),
    }
}

/// Escape LIKE wildcards so the pattern matches literally
fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CompareOp, Field};

    #[test]
    fn test_empty_filter() {
        let result = ComplaintFilter::new().build();
        assert!(result.where_clause.is_empty());
        assert!(result.params.is_empty());
        assert_eq!(result.build_count_query().trim(), "SELECT COUNT(*) FROM complaints");
    }

    #[test]
    fn test_expression_compiles_to_placeholders() {
        let filter = Filter::And(vec![
            Filter::Compare {
                field: Field::UserId,
                op: CompareOp::Eq,
                value: Value::Text("123".into()),
            },
            Filter::Not(Box::new(Filter::IsNull {
                field: Field::Reply,
                negated: false,
            })),
        ]);
        let result = ComplaintFilter::new().expression(Some(&filter)).build();
        assert_eq!(
            result.where_clause,
            "WHERE (user_id = ? AND NOT (reply IS NULL))"
        );
        assert_eq!(result.params.len(), 1);
    }

    #[test]
    fn test_text_match_escapes_wildcards() {
        let filter = Filter::Text {
            field: Field::Content,
            op: TextMatch::Contains,
            pattern: "100%".into(),
        };
        let result = ComplaintFilter::new().expression(Some(&filter)).build();
        assert_eq!(result.where_clause, "WHERE content LIKE ? ESCAPE '\\'");
        assert_eq!(escape_like("100%_a\\"), "100\\%\\_a\\\\");
    }

    #[test]
    fn test_in_list() {
        let filter = Filter::In {
            field: Field::ComplaintCategory,
            values: vec![Value::Text("电视".into()), Value::Text("冰箱".into())],
            negated: true,
        };
        let result = ComplaintFilter::new().expression(Some(&filter)).build();
        assert_eq!(result.where_clause, "WHERE complaint_category NOT IN (?, ?)");
        assert_eq!(result.params.len(), 2);
    }

    #[test]
    fn test_plain_filters_combine() {
        let result = ComplaintFilter::new()
            .category(Some("电视"))
            .user_id(Some("  "))
            .build();
        assert_eq!(result.where_clause, "WHERE complaint_category = ?");
        assert_eq!(result.params.len(), 1);
    }
}
