//! Query results and their renderings
//!
//! A [`QueryResult`] is created for every execution attempt. It renders three
//! ways: a truncated payload for the model, a markdown table for people and CSV
//! for export.

use crate::database::value::Value;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;

/// Rows always returned to the model on top of the cell budget
const ROW_MARGIN: usize = 5;

/// Outcome of one statement execution
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Statement text as submitted
    pub sql: String,
    /// Column labels of the returned rows (empty when no rows came back)
    pub column_names: Vec<String>,
    /// Every returned row, in order
    pub rows: Vec<Vec<Value>>,
    /// When the attempt was issued
    pub executed_at: DateTime<Local>,
    /// Wall-clock time of the attempt, set once it completes
    pub duration: Option<Duration>,
    /// Database fault, if the attempt failed
    pub error: Option<String>,
}

impl QueryResult {
    /// Start a result for `sql`, stamped with the current time
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            column_names: Vec::new(),
            rows: Vec::new(),
            executed_at: Local::now(),
            duration: None,
            error: None,
        }
    }

    /// Attach rows, taking the column labels along with them
    pub fn with_rows(mut self, column_names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        self.column_names = column_names;
        self.rows = rows;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.rows.clear();
        self
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names, available only when at least one row was returned
    pub fn columns(&self) -> Option<&[String]> {
        if self.rows.is_empty() {
            None
        } else {
            Some(&self.column_names)
        }
    }

    /// Render as a markdown pipe table
    ///
    /// With `include_details` the statement is prepended as a fenced `sql` block
    /// followed by a status line. A failed result renders its error line in place
    /// of the table.
    pub fn to_markdown(&self, include_details: bool) -> String {
        let mut md = String::new();

        if include_details {
            md.push_str(&format!("```sql\n{}\n```\n\n", self.sql));
        }

        if let Some(ref error) = self.error {
            md.push_str(&format!("❌ Error: {}\n", error));
            return md;
        }

        if include_details {
            let duration = self
                .duration
                .map(|d| format!("{:.3}s", d.as_secs_f64()))
                .unwrap_or_else(|| "unknown".to_string());
            md.push_str(&format!("✓ Executed in {}\n\n", duration));
        }

        let Some(columns) = self.columns() else {
            md.push_str("No results");
            return md;
        };

        md.push_str(&format!("| {} |\n", columns.join(" | ")));
        md.push_str(&format!("|{}|\n", vec!["---"; columns.len()].join("|")));

        for row in &self.rows {
            let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            md.push_str(&format!("| {} |\n", values.join(" | ")));
        }

        md
    }

    /// Render as CSV with a header row; an empty result is the empty string
    pub fn to_csv(&self) -> String {
        let Some(columns) = self.columns() else {
            return String::new();
        };

        let mut out = String::new();
        push_csv_record(&mut out, columns.iter().map(String::as_str));
        for row in &self.rows {
            let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            push_csv_record(&mut out, values.iter().map(String::as_str));
        }
        out
    }

    /// Truncate for the model to roughly `max_values` cells
    ///
    /// Returns `floor(max_values / columns) + 5` rows at most, with a note when
    /// rows were cut.
    pub fn for_model(&self, max_values: usize) -> DbQueryResponse {
        let Some(columns) = self.columns() else {
            return DbQueryResponse {
                note: Some("No results".to_string()),
                ..Default::default()
            };
        };

        let max_rows = ROW_MARGIN + max_values / columns.len().max(1);
        let rows: Vec<Vec<Value>> = self.rows.iter().take(max_rows).cloned().collect();
        let note = (self.rows.len() > max_rows).then(|| {
            format!(
                "Query returned {} rows, showing first {} only",
                self.rows.len(),
                max_rows
            )
        });

        DbQueryResponse {
            columns: Some(columns.to_vec()),
            rows: Some(rows),
            note,
        }
    }
}

fn push_csv_record<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let fields: Vec<String> = fields.map(escape_csv_field).collect();
    out.push_str(&fields.join(","));
    out.push('\n');
}

fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Query outcome as returned to the model by the `execute_sql` tool
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DbQueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Vec<Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> QueryResult {
        QueryResult::new("SELECT id, name FROM users")
            .with_rows(
                vec!["id".to_string(), "name".to_string()],
                vec![
                    vec![Value::Int(1), Value::from("Alice")],
                    vec![Value::Int(2), Value::from("Bob")],
                ],
            )
            .with_duration(Duration::from_millis(123))
    }

    fn numbered(rows: i64, columns: usize) -> QueryResult {
        let names = (0..columns).map(|c| format!("c{c}")).collect();
        let rows = (0..rows)
            .map(|r| (0..columns).map(|_| Value::Int(r)).collect())
            .collect();
        QueryResult::new("SELECT *").with_rows(names, rows)
    }

    #[test]
    fn test_markdown_with_details() {
        let expected = "```sql\n\
            SELECT id, name FROM users\n\
            ```\n\
            \n\
            ✓ Executed in 0.123s\n\
            \n\
            | id | name |\n\
            |---|---|\n\
            | 1 | Alice |\n\
            | 2 | Bob |\n";
        assert_eq!(users().to_markdown(true), expected);
    }

    #[test]
    fn test_markdown_without_details() {
        assert_eq!(
            users().to_markdown(false),
            "| id | name |\n|---|---|\n| 1 | Alice |\n| 2 | Bob |\n"
        );
    }

    #[test]
    fn test_markdown_error_short_circuits() {
        let result = QueryResult::new("SELECT bad syntax")
            .with_duration(Duration::from_millis(2))
            .with_error("Syntax error");
        assert_eq!(
            result.to_markdown(true),
            "```sql\nSELECT bad syntax\n```\n\n❌ Error: Syntax error\n"
        );
        assert_eq!(result.to_markdown(false), "❌ Error: Syntax error\n");
    }

    #[test]
    fn test_markdown_no_results() {
        let result =
            QueryResult::new("SELECT * FROM empty_table").with_duration(Duration::from_millis(1));
        assert_eq!(
            result.to_markdown(true),
            "```sql\nSELECT * FROM empty_table\n```\n\n✓ Executed in 0.001s\n\nNo results"
        );
    }

    #[test]
    fn test_markdown_null_is_empty() {
        let result = QueryResult::new("SELECT a, b FROM t")
            .with_rows(vec!["a".into(), "b".into()], vec![vec![Value::Null, Value::Int(7)]]);
        assert!(result.to_markdown(false).ends_with("|  | 7 |\n"));
    }

    #[test]
    fn test_csv() {
        let result = QueryResult::new("SELECT id, name, age FROM users").with_rows(
            vec!["id".into(), "name".into(), "age".into()],
            vec![
                vec![Value::Int(1), "Alice".into(), Value::Int(30)],
                vec![Value::Int(2), "Bob".into(), Value::Int(25)],
                vec![Value::Int(3), "Charlie".into(), Value::Null],
            ],
        );
        assert_eq!(result.to_csv(), "id,name,age\n1,Alice,30\n2,Bob,25\n3,Charlie,\n");
        assert_eq!(users().to_csv(), "id,name\n1,Alice\n2,Bob\n");
    }

    #[test]
    fn test_csv_empty_and_quoting() {
        assert_eq!(QueryResult::new("SELECT 1 WHERE 0").to_csv(), "");

        let result = QueryResult::new("SELECT note").with_rows(
            vec!["note".into()],
            vec![vec!["a, \"quoted\"\nvalue".into()]],
        );
        assert_eq!(result.to_csv(), "note\n\"a, \"\"quoted\"\"\nvalue\"\n");
    }

    #[test]
    fn test_properties() {
        let ok = users();
        assert!(ok.success());
        assert_eq!(ok.row_count(), 2);
        assert_eq!(ok.columns(), Some(&["id".to_string(), "name".to_string()][..]));

        let failed = QueryResult::new("SELECT bad").with_error("boom");
        assert!(!failed.success());
        assert_eq!(failed.row_count(), 0);
        assert!(failed.columns().is_none());
    }

    #[test]
    fn test_for_model_truncates_to_cell_budget() {
        let response = numbered(20, 3).for_model(10);
        assert_eq!(response.rows.as_ref().map(Vec::len), Some(8));
        assert_eq!(
            response.note.as_deref(),
            Some("Query returned 20 rows, showing first 8 only")
        );
    }

    #[test]
    fn test_for_model_no_note_within_budget() {
        let response = numbered(8, 3).for_model(10);
        assert_eq!(response.rows.as_ref().map(Vec::len), Some(8));
        assert!(response.note.is_none());
    }

    #[test]
    fn test_for_model_empty() {
        let response = QueryResult::new("SELECT 1 WHERE 0").for_model(200);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "note": "No results" })
        );
    }
}
