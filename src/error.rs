//! Error types for DBdex
//!
//! This module defines the error types used throughout the application.

use thiserror::Error;

/// Result type alias for DBdex
pub type Result<T> = std::result::Result<T, DbdexError>;

/// Main error type for DBdex
#[derive(Error, Debug)]
pub enum DbdexError {
    /// A statement was rejected by the read-only guard
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Schema lookup on tables that were not reflected
    #[error("Invalid table name(s): {}", .tables.join(", "))]
    TableNotFound { tables: Vec<String> },

    /// Database failure while executing a guarded statement
    #[error("Query execution failed: {message}")]
    Execution { message: String },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connection failures at session start
    #[error("Failed to connect to {url}: {source}")]
    DatabaseConnection {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    /// Reflection failures
    #[error("Schema reflection failed: {0}")]
    SchemaIndexing(String),

    /// Unrecognised connection string
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),

    /// Backend without a driver
    #[error("Unsupported database type: {0}")]
    UnsupportedDatabaseType(String),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP-related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error response from a model provider
    #[error("{provider} API error (status {status}): {message}")]
    LLMApiError {
        provider: String,
        message: String,
        status: u16,
    },

    /// No API key could be resolved for a provider
    #[error("No API key configured for {0}")]
    LLMApiKeyMissing(String),

    /// Provider tag not present in the registry
    #[error("Unsupported model provider: {0}")]
    UnsupportedProvider(String),

    /// Model identifier not in `provider:model` form
    #[error("Invalid model name '{0}', expected PROVIDER:MODEL")]
    InvalidModelName(String),

    /// Unknown slash command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Slash command with missing arguments
    #[error("Invalid syntax for {command}, expected: {expected}")]
    InvalidCommandSyntax { command: String, expected: String },

    /// Nothing recorded to display or export
    #[error("No query results to export")]
    NoQueryResults,

    /// The model misbehaved (too many steps, tool retries exhausted)
    #[error("Agent error: {0}")]
    Agent(String),
}

impl DbdexError {
    /// Create an execution error from any displayable fault
    pub fn execution(message: impl std::fmt::Display) -> Self {
        Self::Execution {
            message: message.to_string(),
        }
    }

    /// Create a connection error for the given URL
    pub fn db_connection(url: impl Into<String>, source: sqlx::Error) -> Self {
        Self::DatabaseConnection {
            url: url.into(),
            source,
        }
    }

    /// Create a reflection error, keeping the failing catalog query for context
    pub fn db_query(query: &str, source: sqlx::Error) -> Self {
        let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::SchemaIndexing(format!("{} (query: {})", source, query))
    }

    /// Whether the interactive session can continue after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            DbdexError::Config(_)
                | DbdexError::DatabaseConnection { .. }
                | DbdexError::InvalidDatabaseUrl(_)
                | DbdexError::UnsupportedDatabaseType(_)
                | DbdexError::UnsupportedProvider(_)
                | DbdexError::InvalidModelName(_)
                | DbdexError::LLMApiKeyMissing(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_not_found_lists_all_names() {
        let err = DbdexError::TableNotFound {
            tables: vec!["foo".to_string(), "bar".to_string()],
        };
        assert_eq!(err.to_string(), "Invalid table name(s): foo, bar");
    }

    #[test]
    fn test_api_error_carries_status() {
        let err = DbdexError::LLMApiError {
            provider: "Gemini".to_string(),
            message: "The model is overloaded.".to_string(),
            status: 503,
        };
        let text = err.to_string();
        assert!(text.contains("503"));
        assert!(text.contains("overloaded"));
    }

    #[test]
    fn test_recoverable() {
        assert!(DbdexError::InvalidQuery("x".to_string()).is_recoverable());
        assert!(DbdexError::execution("boom").is_recoverable());
        assert!(!DbdexError::Config("bad".to_string()).is_recoverable());
    }
}
