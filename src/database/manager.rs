//! Database Manager
//!
//! This module implements the DatabaseManager struct which owns the connection
//! pool and the schema reflected at connect time, and runs guarded statements.

use crate::database::connection::{DatabaseBackend, DatabasePool};
use crate::database::executor::{LastQuery, QueryExecutor};
use crate::database::guard::validate_read_only;
use crate::database::result::QueryResult;
use crate::database::schema::SchemaIndex;
use crate::error::Result;
use tracing::info;

/// Database Manager
///
/// Holds the connection pool, the backend type and the schema reflected once
/// when the session connects. The schema is never refreshed afterwards.
pub struct DatabaseManager {
    /// Database connection pool
    pool: DatabasePool,
    /// Database backend type
    backend: DatabaseBackend,
    /// Reflected schema metadata
    schema_index: SchemaIndex,
    /// Runs guarded statements
    executor: QueryExecutor,
}

impl DatabaseManager {
    /// Connects to the database and reflects its schema
    ///
    /// # Arguments
    /// * `url` - Database connection URL (e.g., "postgresql://localhost/mydb")
    ///
    /// # Example
    /// ```no_run
    /// use dbdex::database::manager::DatabaseManager;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let manager = DatabaseManager::connect("sqlite://chinook.db").await?;
    ///     println!("{}", manager.describe_schema(None)?);
    ///     Ok(())
    /// }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = DatabasePool::from_url(url).await?;
        pool.test_connection().await?;

        let backend = pool.backend();
        let schema_index = Self::index_database(&pool).await?;
        info!(
            backend = %backend,
            tables = schema_index.tables.len(),
            "connected to database"
        );

        Ok(Self {
            executor: QueryExecutor::new(pool.clone()),
            pool,
            backend,
            schema_index,
        })
    }

    /// Queries the system catalogs of the connected backend
    async fn index_database(pool: &DatabasePool) -> Result<SchemaIndex> {
        match pool {
            DatabasePool::Sqlite(pool) => crate::database::indexer::index_sqlite(pool).await,
            DatabasePool::Postgres(pool) => crate::database::indexer::index_postgresql(pool).await,
            DatabasePool::MySql(pool) => crate::database::indexer::index_mysql(pool).await,
        }
    }

    /// Get the database backend type
    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Dialect name as shown to the model
    pub fn dialect_name(&self) -> &'static str {
        self.backend.dialect_name()
    }

    /// Get the reflected schema
    pub fn schema(&self) -> &SchemaIndex {
        &self.schema_index
    }

    /// Names of all reflected tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        self.schema_index
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Schema text for the named tables, or for every table when `None`
    pub fn describe_schema(&self, table_names: Option<&[String]>) -> Result<String> {
        self.schema_index.describe(table_names)
    }

    /// Validate and execute a read-only statement
    ///
    /// A statement rejected by the guard never reaches the database and leaves
    /// `last_query` untouched. Every executed statement, failed or not, replaces
    /// the content of `last_query`.
    pub async fn execute_sql(&self, sql: &str, last_query: &LastQuery) -> Result<QueryResult> {
        validate_read_only(sql)?;
        self.executor.execute(sql, last_query).await
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
