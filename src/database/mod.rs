//! Database module
//!
//! This module provides database connection management, schema reflection,
//! the read-only guard, query execution and result rendering.

pub mod connection;
pub mod executor;
pub mod guard;
pub mod indexer;
pub mod manager;
pub mod result;
pub mod schema;
pub mod value;

// Re-exports
pub use connection::{DatabaseBackend, DatabasePool};
pub use executor::{LastQuery, QueryExecutor};
pub use manager::DatabaseManager;
pub use result::{DbQueryResponse, QueryResult};
pub use schema::{Column, Constraint, Index, IndexColumn, SchemaIndex, Table};
pub use value::Value;
