//! Database connection abstraction
//!
//! This module provides the database backend enum and connection pooling logic
//! to support multiple database types (PostgreSQL, MySQL, SQLite).

use crate::error::{DbdexError, Result};
use sqlx::{mysql::MySqlPool, postgres::PgPool, sqlite::SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// PostgreSQL
    PostgreSQL,
    /// MySQL/MariaDB
    MySQL,
    /// SQLite
    SQLite,
}

impl DatabaseBackend {
    /// Parse database URL to determine backend
    pub fn from_url(url: &str) -> Result<Self> {
        let url_lower = normalize_url(url).to_lowercase();

        if url_lower.starts_with("postgres://") || url_lower.starts_with("postgresql://") {
            Ok(DatabaseBackend::PostgreSQL)
        } else if url_lower.starts_with("mysql://") || url_lower.starts_with("mariadb://") {
            Ok(DatabaseBackend::MySQL)
        } else if url_lower.starts_with("sqlite:")
            || url_lower.ends_with(".db")
            || url_lower.ends_with(".sqlite")
            || url_lower.ends_with(".sqlite3")
        {
            Ok(DatabaseBackend::SQLite)
        } else {
            Err(DbdexError::InvalidDatabaseUrl(format!(
                "Unable to determine database type from URL: {}",
                url
            )))
        }
    }

    /// Get the name of this database backend
    pub fn name(&self) -> &str {
        match self {
            DatabaseBackend::PostgreSQL => "PostgreSQL",
            DatabaseBackend::MySQL => "MySQL",
            DatabaseBackend::SQLite => "SQLite",
        }
    }

    /// Lower-case dialect identifier used in the system prompt
    pub fn dialect_name(&self) -> &'static str {
        match self {
            DatabaseBackend::PostgreSQL => "postgresql",
            DatabaseBackend::MySQL => "mysql",
            DatabaseBackend::SQLite => "sqlite",
        }
    }
}

impl FromStr for DatabaseBackend {
    type Err = DbdexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(DatabaseBackend::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseBackend::MySQL),
            "sqlite" | "sqlite3" => Ok(DatabaseBackend::SQLite),
            _ => Err(DbdexError::UnsupportedDatabaseType(s.to_string())),
        }
    }
}

impl std::fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Normalise a connection string into the form sqlx expects
///
/// Accepts SQLAlchemy-style driver suffixes (`postgresql+psycopg://`,
/// `mysql+pymysql://`) and the SQLAlchemy SQLite forms: `sqlite:///file.db`
/// is relative to the working directory, `sqlite:////abs/file.db` absolute.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();

    let url = match url.split_once("://") {
        Some((scheme, rest)) => match scheme.split_once('+') {
            Some((base, _driver)) => format!("{}://{}", base, rest),
            None => url.to_string(),
        },
        None => url.to_string(),
    };

    // sqlite:////abs/path and sqlite:///rel/path
    if let Some(path) = url.strip_prefix("sqlite:///") {
        return format!("sqlite://{}", path);
    }

    url
}

/// Database connection pool wrapper
///
/// This enum holds the actual database pool for the connected backend.
#[derive(Clone)]
pub enum DatabasePool {
    /// SQLite pool
    Sqlite(SqlitePool),
    /// PostgreSQL pool
    Postgres(PgPool),
    /// MySQL pool
    MySql(MySqlPool),
}

impl DatabasePool {
    /// Get the database backend for this pool
    pub fn backend(&self) -> DatabaseBackend {
        match self {
            DatabasePool::Sqlite(_) => DatabaseBackend::SQLite,
            DatabasePool::Postgres(_) => DatabaseBackend::PostgreSQL,
            DatabasePool::MySql(_) => DatabaseBackend::MySQL,
        }
    }

    /// Create a new database pool from connection URL
    ///
    /// Connections are checked out per statement, so a small pool is enough
    /// for the single interactive session.
    pub async fn from_url(url: &str) -> Result<Self> {
        Self::from_url_with_options(url, 2).await
    }

    /// Create a new database pool with custom options
    pub async fn from_url_with_options(url: &str, max_connections: u32) -> Result<Self> {
        let normalized = normalize_url(url);
        let backend = DatabaseBackend::from_url(&normalized)?;
        let idle_timeout = Some(Duration::from_secs(60));

        debug!(backend = %backend, max_connections, "opening connection pool");

        match backend {
            DatabaseBackend::SQLite => {
                let options = sqlx::sqlite::SqliteConnectOptions::from_str(&normalized)
                    .map_err(|e| DbdexError::db_connection(url, e))?;
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .idle_timeout(idle_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| DbdexError::db_connection(url, e))?;
                Ok(DatabasePool::Sqlite(pool))
            }
            DatabaseBackend::PostgreSQL => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(max_connections)
                    .idle_timeout(idle_timeout)
                    .connect(&normalized)
                    .await
                    .map_err(|e| DbdexError::db_connection(url, e))?;
                Ok(DatabasePool::Postgres(pool))
            }
            DatabaseBackend::MySQL => {
                let pool = sqlx::mysql::MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .idle_timeout(idle_timeout)
                    .connect(&normalized)
                    .await
                    .map_err(|e| DbdexError::db_connection(url, e))?;
                Ok(DatabasePool::MySql(pool))
            }
        }
    }

    /// Test the connection
    pub async fn test_connection(&self) -> Result<()> {
        let outcome = match self {
            DatabasePool::Sqlite(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ()),
            DatabasePool::Postgres(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ()),
            DatabasePool::MySql(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.map(|_| ()),
        };
        outcome.map_err(|e| DbdexError::db_connection("test connection", e))
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        match self {
            DatabasePool::Sqlite(pool) => pool.close().await,
            DatabasePool::Postgres(pool) => pool.close().await,
            DatabasePool::MySql(pool) => pool.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            DatabaseBackend::from_url("postgresql://localhost/test").unwrap(),
            DatabaseBackend::PostgreSQL
        );
        assert_eq!(
            DatabaseBackend::from_url("postgres://localhost/test").unwrap(),
            DatabaseBackend::PostgreSQL
        );
        assert_eq!(
            DatabaseBackend::from_url("mysql://localhost/test").unwrap(),
            DatabaseBackend::MySQL
        );
        assert_eq!(
            DatabaseBackend::from_url("sqlite://test.db").unwrap(),
            DatabaseBackend::SQLite
        );
        assert_eq!(
            DatabaseBackend::from_url("test.db").unwrap(),
            DatabaseBackend::SQLite
        );
    }

    #[test]
    fn test_driver_suffixed_urls() {
        assert_eq!(
            DatabaseBackend::from_url("postgresql+psycopg://u:p@localhost/app").unwrap(),
            DatabaseBackend::PostgreSQL
        );
        assert_eq!(
            DatabaseBackend::from_url("mysql+pymysql://localhost/app").unwrap(),
            DatabaseBackend::MySQL
        );
    }

    #[tokio::test]
    async fn test_sqlite_absolute_path_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("abs.db");
        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        sqlx::sqlite::SqlitePool::connect_with(options)
            .await
            .unwrap()
            .close()
            .await;

        let url = format!("sqlite:///{}", path.display());
        assert!(url.starts_with("sqlite:////"));
        let pool = DatabasePool::from_url(&url).await.unwrap();
        pool.test_connection().await.unwrap();
        pool.close().await;

        // three slashes resolve against the working directory instead
        let relative = format!("sqlite://{}", path.display());
        assert_eq!(
            normalize_url(&relative),
            format!("sqlite://{}", path.display().to_string().trim_start_matches('/'))
        );
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("postgresql+asyncpg://u@h/db"),
            "postgresql://u@h/db"
        );
        assert_eq!(normalize_url("sqlite:///chinook.db"), "sqlite://chinook.db");
        assert_eq!(normalize_url("sqlite:////tmp/a.db"), "sqlite:///tmp/a.db");
        assert_eq!(normalize_url(" mysql://h/db "), "mysql://h/db");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(
            "postgres".parse::<DatabaseBackend>().unwrap(),
            DatabaseBackend::PostgreSQL
        );
        assert_eq!(
            "mariadb".parse::<DatabaseBackend>().unwrap(),
            DatabaseBackend::MySQL
        );
        assert!("mssql".parse::<DatabaseBackend>().is_err());
    }

    #[test]
    fn test_invalid_url() {
        assert!(DatabaseBackend::from_url("invalid://url").is_err());
    }

    #[test]
    fn test_dialect_name() {
        assert_eq!(DatabaseBackend::PostgreSQL.dialect_name(), "postgresql");
        assert_eq!(DatabaseBackend::SQLite.to_string(), "SQLite");
    }
}
