//! Session dependencies handed to the agent's tools
//!
//! The output sink decouples tool side effects (printing the full result table)
//! from the terminal so sessions can be driven without one.

use crate::database::executor::LastQuery;
use crate::database::manager::DatabaseManager;
use crate::database::result::QueryResult;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Default maximum number of cells returned to the model per query
pub const DEFAULT_MAX_RETURN_VALUES: usize = 200;

/// Where user-visible output goes
pub trait OutputSink: Send + Sync {
    /// A complete block of text (a reply or a command message)
    fn write_text(&self, text: &str);

    /// A streamed fragment of the reply in progress
    fn write_chunk(&self, chunk: &str);

    /// The full table of a query result
    fn write_result(&self, result: &QueryResult);
}

/// Prints to stdout, tables rendered with comfy-table
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalSink;

impl TerminalSink {
    /// Build the terminal table for a result
    pub fn render(result: &QueryResult) -> Option<Table> {
        let columns = result.columns()?;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(columns.to_vec());
        for row in &result.rows {
            table.add_row(row.iter().map(|value| value.to_string()));
        }
        Some(table)
    }

    /// What `write_result` prints: the error line of a failed attempt, the
    /// table, or "No results"
    pub fn display(result: &QueryResult) -> String {
        if result.error.is_some() {
            return result.to_markdown(false).trim_end().to_string();
        }
        match Self::render(result) {
            Some(table) => table.to_string(),
            None => "No results".to_string(),
        }
    }
}

impl OutputSink for TerminalSink {
    fn write_text(&self, text: &str) {
        println!("{}", text);
    }

    fn write_chunk(&self, chunk: &str) {
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    }

    fn write_result(&self, result: &QueryResult) {
        println!("{}", Self::display(result));
    }
}

/// Collects output in memory
///
/// Results are recorded as Markdown tables without details.
#[derive(Debug, Default)]
pub struct BufferSink {
    buffer: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        self.lock().clone()
    }

    /// Take the buffered output, leaving it empty
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OutputSink for BufferSink {
    fn write_text(&self, text: &str) {
        let mut buffer = self.lock();
        buffer.push_str(text);
        buffer.push('\n');
    }

    fn write_chunk(&self, chunk: &str) {
        self.lock().push_str(chunk);
    }

    fn write_result(&self, result: &QueryResult) {
        self.lock().push_str(&result.to_markdown(false));
    }
}

/// Long-lived per-session state shared with tools and commands
pub struct AgentDeps {
    /// Connected database with its reflected schema
    pub database: Arc<DatabaseManager>,
    /// Maximum number of cells (rows x columns) returned to the model
    pub max_return_values: usize,
    /// User-visible output
    pub sink: Arc<dyn OutputSink>,
    /// Most recent execution attempt, failed or not
    pub last_query: LastQuery,
}

impl AgentDeps {
    pub fn new(database: Arc<DatabaseManager>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            database,
            max_return_values: DEFAULT_MAX_RETURN_VALUES,
            sink,
            last_query: LastQuery::default(),
        }
    }

    pub fn with_max_return_values(mut self, max_return_values: usize) -> Self {
        self.max_return_values = max_return_values;
        self
    }

    /// Copy of the last recorded result
    pub async fn last_result(&self) -> Option<QueryResult> {
        self.last_query.read().await.clone()
    }
}
