//! Schema data structures
//!
//! This module defines the reflected schema model (tables, columns, indexes and
//! constraints) and renders it into the deterministic text block that is handed
//! to the model as database context.

use crate::error::{DbdexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Index access methods whose key columns have no ordering
const UNORDERED_INDEX_METHODS: &[&str] = &["gin", "gist", "spgist", "brin", "hash", "fulltext", "spatial"];

/// Represents a column in a database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type as reported by the database (e.g. "VARCHAR(255)")
    pub data_type: String,
    /// Whether the column is nullable
    pub nullable: bool,
    /// Whether this column is part of the primary key
    pub is_primary_key: bool,
    /// Whether the column itself is declared unique
    pub is_unique: bool,
    /// Default expression (if any)
    pub default_value: Option<String>,
}

impl Column {
    /// Create a nullable, non-key column
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            is_primary_key: false,
            is_unique: false,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;

        if self.is_primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        if let Some(ref default) = self.default_value {
            write!(f, " DEFAULT {}", default)?;
        }
        if self.is_unique {
            write!(f, " UNIQUE")?;
        }

        Ok(())
    }
}

/// One key column of an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub name: String,
    pub descending: bool,
}

impl IndexColumn {
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: true,
        }
    }
}

/// Represents a (non-constraint) index on a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Key columns in index order
    pub columns: Vec<IndexColumn>,
    /// Access method hint (e.g. "btree", "gin")
    pub method: Option<String>,
}

impl Index {
    pub fn new(name: impl Into<String>, columns: Vec<IndexColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
            method: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Whether the access method ignores column direction
    pub fn is_unordered(&self) -> bool {
        self.method.as_deref().is_some_and(|method| {
            UNORDERED_INDEX_METHODS
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method))
        })
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unordered = self.is_unordered();
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                if unordered {
                    col.name.clone()
                } else if col.descending {
                    format!("{} DESC", col.name)
                } else {
                    format!("{} ASC", col.name)
                }
            })
            .collect();
        write!(f, "INDEX {} ({})", self.name, columns.join(", "))
    }
}

/// Table-level constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// One referencing column of a foreign key
    ForeignKey {
        column: String,
        target_table: String,
        target_column: String,
    },
    /// Unique constraint over a column set
    Unique { columns: Vec<String> },
}

impl Constraint {
    pub fn foreign_key(
        column: impl Into<String>,
        target_table: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Constraint::ForeignKey {
            column: column.into(),
            target_table: target_table.into(),
            target_column: target_column.into(),
        }
    }

    pub fn unique<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Constraint::Unique {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::ForeignKey {
                column,
                target_table,
                target_column,
            } => write!(
                f,
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                column, target_table, target_column
            ),
            Constraint::Unique { columns } => write!(f, "UNIQUE ({})", columns.join(", ")),
        }
    }
}

/// Represents a reflected database table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Table columns in declaration order
    pub columns: Vec<Column>,
    /// Indexes that do not back a constraint
    pub indexes: Vec<Index>,
    /// Foreign key and unique constraints
    pub constraints: Vec<Constraint>,
}

impl Table {
    /// Create a new table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column to the table
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Get a column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| matches!(c, Constraint::ForeignKey { .. }))
    }

    pub fn unique_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .iter()
            .filter(|c| matches!(c, Constraint::Unique { .. }))
    }

    /// Render the table as a schema block:
    ///
    /// ```text
    /// TABLE name (
    ///     COLUMNS
    ///         column type [PRIMARY KEY] [NOT NULL] [DEFAULT value] [UNIQUE],
    ///     ---
    ///     INDEXES
    ///         INDEX name (column [ASC|DESC]),
    ///     ---
    ///     CONSTRAINTS
    ///         FOREIGN KEY (column) REFERENCES table (column),
    ///         UNIQUE (column, ...)
    /// )
    /// ```
    ///
    /// Every section drops the comma after its own last line.
    pub fn format_schema(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        let indexes: Vec<String> = self.indexes.iter().map(|i| i.to_string()).collect();
        // foreign keys first, then unique constraints
        let constraints: Vec<String> = self
            .foreign_keys()
            .chain(self.unique_constraints())
            .map(|c| c.to_string())
            .collect();

        let mut lines = vec![format!("TABLE {} (", self.name)];
        push_section(&mut lines, "COLUMNS", &columns);
        lines.push("    ---".to_string());
        push_section(&mut lines, "INDEXES", &indexes);
        lines.push("    ---".to_string());
        push_section(&mut lines, "CONSTRAINTS", &constraints);
        lines.push(")".to_string());

        lines.join("\n")
    }
}

fn push_section(lines: &mut Vec<String>, header: &str, entries: &[String]) {
    lines.push(format!("    {}", header));
    let last = entries.len().saturating_sub(1);
    for (i, entry) in entries.iter().enumerate() {
        let separator = if i == last { "" } else { "," };
        lines.push(format!("        {}{}", entry, separator));
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_schema())
    }
}

/// Reflected metadata for one database connection
///
/// Built once when the session connects and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaIndex {
    /// Database name (if available)
    pub database_name: Option<String>,
    /// Tables indexed by name
    pub tables: BTreeMap<String, Table>,
    /// Reflection timestamp
    pub indexed_at: chrono::DateTime<chrono::Utc>,
}

impl SchemaIndex {
    /// Create a new schema index
    pub fn new() -> Self {
        Self {
            database_name: None,
            tables: BTreeMap::new(),
            indexed_at: chrono::Utc::now(),
        }
    }

    /// Add a table to the index
    pub fn add_table(&mut self, table: Table) {
        let name = table.name.clone();
        self.tables.insert(name, table);
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Get all table names
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }

    /// Describe the selected tables (all tables when `table_names` is `None`)
    ///
    /// Unknown names fail the whole request with [`DbdexError::TableNotFound`]
    /// listing every missing name; nothing is rendered in that case.
    pub fn describe(&self, table_names: Option<&[String]>) -> Result<String> {
        let tables: Vec<&Table> = match table_names {
            Some(names) if !names.is_empty() => {
                let missing: Vec<String> = names
                    .iter()
                    .filter(|name| !self.tables.contains_key(name.as_str()))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(DbdexError::TableNotFound { tables: missing });
                }
                names
                    .iter()
                    .filter_map(|name| self.tables.get(name.as_str()))
                    .collect()
            }
            _ => self.tables.values().collect(),
        };

        Ok(tables
            .iter()
            .map(|table| table.format_schema())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

impl Default for SchemaIndex {
    fn default() -> Self {
        Self::new()
    }
}
