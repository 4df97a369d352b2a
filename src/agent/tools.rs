//! Tools exposed to the model
//!
//! `execute_sql` runs a guarded statement and returns a truncated payload.
//! `show_result_table` prints the full last result to the output sink so the
//! model does not have to repeat the data in its reply.

use crate::agent::deps::AgentDeps;
use crate::database::result::DbQueryResponse;
use crate::error::DbdexError;
use crate::llm::provider::{ToolCall, ToolDefinition};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

pub const EXECUTE_SQL: &str = "execute_sql";
pub const SHOW_RESULT_TABLE: &str = "show_result_table";

/// Appended to every retryable tool failure sent back to the model
pub const RETRY_HINT: &str = "Fix the errors and try again.";

pub const NO_PREVIOUS_RESULTS: &str = "No previous query results.";
pub const RESULT_DISPLAYED: &str =
    "Result displayed, DO NOT also provide the result data in your response.";

/// A failed tool call
#[derive(Debug)]
pub enum ToolError {
    /// The model can fix this by changing its call
    Retry(String),
    /// Abort the turn
    Fatal(DbdexError),
}

impl ToolError {
    /// Text of a retryable failure as the model receives it
    pub fn retry_message(message: &str) -> String {
        format!("{}\n\n{}", message, RETRY_HINT)
    }
}

impl From<DbdexError> for ToolError {
    fn from(err: DbdexError) -> Self {
        match err {
            DbdexError::InvalidQuery(message) => ToolError::Retry(message),
            other => ToolError::Fatal(other),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteSqlArgs {
    sql: String,
}

/// Definitions advertised to the model
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: EXECUTE_SQL.to_string(),
            description: "Execute the given SQL query and return the result as a JSON object \
                with optional `columns`, `rows` and `note` fields. The rows may be truncated \
                when the result is large; the note says so."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string", "description": "A single SELECT statement"}
                },
                "required": ["sql"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: SHOW_RESULT_TABLE.to_string(),
            description: "Display the entire result of the previous database query as a table, \
                not just the rows returned by execute_sql. Call this instead of formatting \
                the data as a table in your response."
                .to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        },
    ]
}

/// Run the tool a model asked for, returning the content of its tool message
pub async fn dispatch(deps: &AgentDeps, call: &ToolCall) -> Result<String, ToolError> {
    debug!(tool = %call.name, id = %call.id, "tool call");
    match call.name.as_str() {
        EXECUTE_SQL => {
            let args: ExecuteSqlArgs = serde_json::from_value(call.arguments.clone())
                .map_err(|e| ToolError::Retry(format!("Invalid arguments for {}: {}", EXECUTE_SQL, e)))?;
            let response = execute_sql(deps, &args.sql).await?;
            serde_json::to_string(&response).map_err(|e| ToolError::Fatal(e.into()))
        }
        SHOW_RESULT_TABLE => Ok(show_result_table(deps).await.to_string()),
        other => {
            warn!(tool = other, "model called an unknown tool");
            Err(ToolError::Retry(format!(
                "Unknown tool name: '{}'. Available tools: {}, {}",
                other, EXECUTE_SQL, SHOW_RESULT_TABLE
            )))
        }
    }
}

/// Execute `sql` and shape the result for the model
///
/// Guard rejections are retryable; database failures abort the turn after the
/// failed attempt has been recorded.
pub async fn execute_sql(deps: &AgentDeps, sql: &str) -> Result<DbQueryResponse, ToolError> {
    let result = deps.database.execute_sql(sql, &deps.last_query).await?;
    Ok(result.for_model(deps.max_return_values))
}

/// Print the full last result to the sink
pub async fn show_result_table(deps: &AgentDeps) -> &'static str {
    let last_query = deps.last_query.read().await;
    match last_query.as_ref() {
        Some(result) => {
            deps.sink.write_result(result);
            RESULT_DISPLAYED
        }
        None => NO_PREVIOUS_RESULTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::deps::{BufferSink, TerminalSink};
    use crate::database::manager::DatabaseManager;
    use std::sync::Arc;

    async fn deps(sink: Arc<BufferSink>) -> AgentDeps {
        let database = DatabaseManager::connect("sqlite::memory:").await.unwrap();
        AgentDeps::new(Arc::new(database), sink).with_max_return_values(2)
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall::new("call_1", name, arguments)
    }

    #[tokio::test]
    async fn test_execute_sql_truncates_for_model() {
        let deps = deps(Arc::new(BufferSink::new())).await;
        let content = dispatch(
            &deps,
            &call(
                EXECUTE_SQL,
                json!({"sql": "SELECT value AS x FROM json_each('[1,2,3,4,5,6,7,8,9,10]')"}),
            ),
        )
        .await
        .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(payload["columns"], json!(["x"]));
        assert_eq!(payload["rows"].as_array().unwrap().len(), 7);
        assert_eq!(payload["note"], "Query returned 10 rows, showing first 7 only");
    }

    #[tokio::test]
    async fn test_guard_rejection_is_retryable() {
        let deps = deps(Arc::new(BufferSink::new())).await;
        let err = dispatch(&deps, &call(EXECUTE_SQL, json!({"sql": "DROP TABLE users"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Retry(ref m) if m == "Only SELECT style queries are allowed"));
        assert!(deps.last_result().await.is_none());
    }

    #[tokio::test]
    async fn test_execution_fault_is_fatal_and_recorded() {
        let deps = deps(Arc::new(BufferSink::new())).await;
        let err = dispatch(&deps, &call(EXECUTE_SQL, json!({"sql": "SELECT * FROM missing"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Fatal(DbdexError::Execution { .. })));

        let recorded = deps.last_result().await.unwrap();
        assert!(recorded.error.is_some());
        assert!(recorded.duration.is_some());
    }

    #[tokio::test]
    async fn test_bad_arguments_and_unknown_tool() {
        let deps = deps(Arc::new(BufferSink::new())).await;
        let err = dispatch(&deps, &call(EXECUTE_SQL, json!({"query": "SELECT 1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Retry(_)));

        let err = dispatch(&deps, &call("drop_everything", json!({}))).await.unwrap_err();
        assert!(matches!(err, ToolError::Retry(ref m) if m.contains("drop_everything")));
    }

    #[tokio::test]
    async fn test_empty_result_note() {
        let deps = deps(Arc::new(BufferSink::new())).await;
        let content = dispatch(&deps, &call(EXECUTE_SQL, json!({"sql": "SELECT 1 WHERE 0"})))
            .await
            .unwrap();
        assert_eq!(content, r#"{"note":"No results"}"#);
    }

    #[tokio::test]
    async fn test_show_result_table() {
        let sink = Arc::new(BufferSink::new());
        let deps = deps(sink.clone()).await;

        let content = dispatch(&deps, &call(SHOW_RESULT_TABLE, json!({}))).await.unwrap();
        assert_eq!(content, NO_PREVIOUS_RESULTS);
        assert!(sink.contents().is_empty());

        dispatch(&deps, &call(EXECUTE_SQL, json!({"sql": "SELECT 1 AS one, 'a' AS letter"})))
            .await
            .unwrap();
        let content = dispatch(&deps, &call(SHOW_RESULT_TABLE, json!({}))).await.unwrap();
        assert_eq!(content, RESULT_DISPLAYED);
        assert_eq!(sink.contents(), "| one | letter |\n|---|---|\n| 1 | a |\n");
    }

    #[tokio::test]
    async fn test_show_result_table_after_failed_execution() {
        let sink = Arc::new(BufferSink::new());
        let deps = deps(sink.clone()).await;

        dispatch(&deps, &call(EXECUTE_SQL, json!({"sql": "SELECT * FROM missing"})))
            .await
            .unwrap_err();
        let content = dispatch(&deps, &call(SHOW_RESULT_TABLE, json!({}))).await.unwrap();
        assert_eq!(content, RESULT_DISPLAYED);
        assert!(sink.contents().starts_with("❌ Error: "));

        let failed = deps.last_result().await.unwrap();
        let shown = TerminalSink::display(&failed);
        assert!(shown.starts_with("❌ Error: "));
        assert!(shown.contains("missing"));
    }

    #[test]
    fn test_retry_message() {
        assert_eq!(
            ToolError::retry_message("Only SELECT style queries are allowed"),
            "Only SELECT style queries are allowed\n\nFix the errors and try again."
        );
    }
}
