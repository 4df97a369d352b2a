//! Statement execution
//!
//! Runs a statement that already passed the read-only guard and records the
//! outcome, successful or not, in the session's last-result slot.

use crate::database::connection::DatabasePool;
use crate::database::result::QueryResult;
use crate::database::value::{DecodeRow, Value};
use crate::error::{DbdexError, Result};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Session-owned slot holding the most recent execution attempt
pub type LastQuery = RwLock<Option<QueryResult>>;

type Fetched = (Vec<String>, Vec<Vec<Value>>);

// One pooled connection per statement, returned to the pool when dropped
macro_rules! fetch_all {
    ($pool:expr, $sql:expr) => {{
        let mut conn = $pool.acquire().await?;
        let rows = sqlx::query($sql).fetch_all(&mut *conn).await?;
        let columns = rows.first().map(|row| row.column_names()).unwrap_or_default();
        let values = rows.iter().map(|row| row.decode_values()).collect();
        (columns, values)
    }};
}

/// Executes guarded statements against a pool
#[derive(Clone)]
pub struct QueryExecutor {
    pool: DatabasePool,
}

impl QueryExecutor {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Execute `sql`, collecting every row
    ///
    /// The slot is overwritten whatever the outcome. On failure the recorded
    /// result carries the error and no rows, and the same fault is returned as
    /// [`DbdexError::Execution`].
    pub async fn execute(&self, sql: &str, last_query: &LastQuery) -> Result<QueryResult> {
        let mut result = QueryResult::new(sql);

        debug!(sql = %sql, "executing statement");
        let start = Instant::now();
        let outcome = self.fetch(sql).await;
        let elapsed = start.elapsed();

        result = result.with_duration(elapsed);
        let outcome = match outcome {
            Ok((columns, rows)) => {
                info!(
                    rows = rows.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "statement executed"
                );
                result = result.with_rows(columns, rows);
                Ok(())
            }
            Err(err) => {
                warn!(sql = %sql, error = %err, "statement failed");
                result = result.with_error(err.to_string());
                Err(DbdexError::execution(err))
            }
        };

        *last_query.write().await = Some(result.clone());

        outcome.map(|_| result)
    }

    async fn fetch(&self, sql: &str) -> std::result::Result<Fetched, sqlx::Error> {
        let fetched = match &self.pool {
            DatabasePool::Sqlite(pool) => fetch_all!(pool, sql),
            DatabasePool::Postgres(pool) => fetch_all!(pool, sql),
            DatabasePool::MySql(pool) => fetch_all!(pool, sql),
        };
        Ok(fetched)
    }
}
