//! Schema Indexer
//!
//! This module implements schema reflection for the supported database backends.
//! Each backend has its own indexing function that queries the system catalogs
//! and builds a complete [`SchemaIndex`] of base tables: columns, primary keys,
//! indexes, foreign keys and unique constraints.

use crate::database::schema::{Column, Constraint, Index, IndexColumn, SchemaIndex, Table};
use crate::error::{DbdexError, Result};
use sqlx::postgres::types::Oid;
use sqlx::{mysql::MySqlPool, postgres::PgPool, sqlite::SqlitePool, Row};
use tracing::{debug, info};

/// Index SQLite database schema
pub async fn index_sqlite(pool: &SqlitePool) -> Result<SchemaIndex> {
    let mut schema_index = SchemaIndex::new();
    schema_index.database_name = Some("main".to_string());

    let tables_query = r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;

    let tables_rows = sqlx::query(tables_query)
        .fetch_all(pool)
        .await
        .map_err(|e| DbdexError::db_query(tables_query, e))?;

    for row in tables_rows {
        let table_name: String = row.try_get("name")?;
        let mut table = Table::new(&table_name);

        // Columns, with the primary key flag from table_info
        let columns_query = r#"
            SELECT name, type, "notnull" AS not_null, dflt_value, pk
            FROM pragma_table_info(?)
            ORDER BY cid
        "#;

        let columns_rows = sqlx::query(columns_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(columns_query, e))?;

        for col_row in columns_rows {
            let name: String = col_row.try_get("name")?;
            let data_type: String = col_row.try_get("type")?;
            let not_null: i64 = col_row.try_get("not_null")?;
            let default_value: Option<String> = col_row.try_get("dflt_value")?;
            let pk: i64 = col_row.try_get("pk")?;

            let data_type = if data_type.is_empty() {
                "NULL".to_string()
            } else {
                data_type
            };

            let mut column = Column::new(name, data_type);
            column.nullable = not_null == 0;
            column.default_value = default_value;
            if pk > 0 {
                column = column.primary_key();
            }
            table.add_column(column);
        }

        // Explicit indexes become INDEX lines, UNIQUE table constraints become constraints
        let index_list_query = r#"
            SELECT name, origin
            FROM pragma_index_list(?)
            ORDER BY name
        "#;

        let index_rows = sqlx::query(index_list_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(index_list_query, e))?;

        for index_row in index_rows {
            let index_name: String = index_row.try_get("name")?;
            let origin: String = index_row.try_get("origin")?;

            match origin.as_str() {
                "c" => {
                    let columns = sqlite_index_columns(pool, &index_name).await?;
                    table.indexes.push(Index::new(index_name, columns));
                }
                "u" => {
                    let columns = sqlite_index_columns(pool, &index_name).await?;
                    table
                        .constraints
                        .push(Constraint::unique(columns.into_iter().map(|c| c.name)));
                }
                _ => {}
            }
        }

        let fk_query = r#"
            SELECT "from" AS column_name, "table" AS target_table, "to" AS target_column
            FROM pragma_foreign_key_list(?)
            ORDER BY id, seq
        "#;

        let fk_rows = sqlx::query(fk_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(fk_query, e))?;

        for fk_row in fk_rows {
            let column_name: String = fk_row.try_get("column_name")?;
            let target_table: String = fk_row.try_get("target_table")?;
            let target_column: Option<String> = fk_row.try_get("target_column")?;

            // REFERENCES parent without a column list targets the parent's primary key
            let target_column = match target_column {
                Some(column) => column,
                None => sqlite_primary_key(pool, &target_table)
                    .await?
                    .unwrap_or_default(),
            };

            table
                .constraints
                .push(Constraint::foreign_key(column_name, target_table, target_column));
        }

        debug!(table = %table_name, columns = table.columns.len(), "reflected table");
        schema_index.add_table(table);
    }

    info!(tables = schema_index.tables.len(), "indexed SQLite schema");
    Ok(schema_index)
}

async fn sqlite_index_columns(pool: &SqlitePool, index_name: &str) -> Result<Vec<IndexColumn>> {
    let query = r#"
        SELECT name, "desc" AS descending
        FROM pragma_index_xinfo(?)
        WHERE key = 1
        ORDER BY seqno
    "#;

    let rows = sqlx::query(query)
        .bind(index_name)
        .fetch_all(pool)
        .await
        .map_err(|e| DbdexError::db_query(query, e))?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        // expression index terms have no column name
        let Some(name) = row.try_get::<Option<String>, _>("name")? else {
            continue;
        };
        let descending: i64 = row.try_get("descending")?;
        columns.push(IndexColumn {
            name,
            descending: descending != 0,
        });
    }
    Ok(columns)
}

async fn sqlite_primary_key(pool: &SqlitePool, table_name: &str) -> Result<Option<String>> {
    let query = "SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk LIMIT 1";
    let row: Option<(String,)> = sqlx::query_as(query)
        .bind(table_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| DbdexError::db_query(query, e))?;
    Ok(row.map(|(name,)| name))
}

/// Index PostgreSQL database schema (tables of the current schema)
pub async fn index_postgresql(pool: &PgPool) -> Result<SchemaIndex> {
    let mut schema_index = SchemaIndex::new();

    let db_row: Option<(String,)> = sqlx::query_as("SELECT current_database()::text")
        .fetch_optional(pool)
        .await?;
    if let Some((db_name,)) = db_row {
        schema_index.database_name = Some(db_name);
    }

    let tables_query = r#"
        SELECT c.oid, c.relname::text AS name
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = current_schema()
            AND c.relkind IN ('r', 'p')
        ORDER BY c.relname
    "#;

    let tables_rows = sqlx::query(tables_query)
        .fetch_all(pool)
        .await
        .map_err(|e| DbdexError::db_query(tables_query, e))?;

    for row in tables_rows {
        let oid: Oid = row.try_get("oid")?;
        let table_name: String = row.try_get("name")?;
        let mut table = Table::new(&table_name);

        let columns_query = r#"
            SELECT
                a.attname::text AS name,
                format_type(a.atttypid, a.atttypmod) AS data_type,
                a.attnotnull AS not_null,
                pg_get_expr(d.adbin, d.adrelid) AS default_value
            FROM pg_attribute a
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE a.attrelid = $1
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let columns_rows = sqlx::query(columns_query)
            .bind(oid)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(columns_query, e))?;

        for col_row in columns_rows {
            let name: String = col_row.try_get("name")?;
            let data_type: String = col_row.try_get("data_type")?;
            let not_null: bool = col_row.try_get("not_null")?;
            let default_value: Option<String> = col_row.try_get("default_value")?;

            let mut column = Column::new(name, postgres_type_name(&data_type));
            column.nullable = !not_null;
            column.default_value = default_value;
            table.add_column(column);
        }

        // Primary key, unique and foreign key constraints with ordered column lists
        let constraints_query = r#"
            SELECT
                con.contype::text AS kind,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ) AS columns,
                ref.relname::text AS target_table,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                    JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                    ORDER BY k.ord
                ) AS target_columns
            FROM pg_constraint con
            LEFT JOIN pg_class ref ON ref.oid = con.confrelid
            WHERE con.conrelid = $1
                AND con.contype IN ('p', 'u', 'f')
            ORDER BY con.conname
        "#;

        let constraint_rows = sqlx::query(constraints_query)
            .bind(oid)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(constraints_query, e))?;

        for con_row in constraint_rows {
            let kind: String = con_row.try_get("kind")?;
            let columns: Vec<String> = con_row.try_get("columns")?;

            match kind.as_str() {
                "p" => {
                    for column in table.columns.iter_mut().filter(|c| columns.contains(&c.name)) {
                        column.is_primary_key = true;
                        column.nullable = false;
                    }
                }
                "u" => table.constraints.push(Constraint::unique(columns)),
                "f" => {
                    let target_table: Option<String> = con_row.try_get("target_table")?;
                    let target_columns: Vec<String> = con_row.try_get("target_columns")?;
                    let target_table = target_table.unwrap_or_default();
                    for (column, target_column) in columns.into_iter().zip(target_columns) {
                        table.constraints.push(Constraint::foreign_key(
                            column,
                            target_table.clone(),
                            target_column,
                        ));
                    }
                }
                _ => {}
            }
        }

        // Indexes not backing a primary key, unique or exclusion constraint
        let indexes_query = r#"
            SELECT
                ic.relname::text AS name,
                am.amname::text AS method,
                ARRAY(
                    SELECT a.attname::text
                    FROM unnest(i.indkey::int2[], i.indoption::int2[]) WITH ORDINALITY AS k(attnum, opt, ord)
                    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                    WHERE k.ord <= i.indnkeyatts
                    ORDER BY k.ord
                ) AS columns,
                ARRAY(
                    SELECT (k.opt & 1) = 1
                    FROM unnest(i.indkey::int2[], i.indoption::int2[]) WITH ORDINALITY AS k(attnum, opt, ord)
                    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                    WHERE k.ord <= i.indnkeyatts
                    ORDER BY k.ord
                ) AS descending
            FROM pg_index i
            JOIN pg_class ic ON ic.oid = i.indexrelid
            JOIN pg_am am ON am.oid = ic.relam
            WHERE i.indrelid = $1
                AND NOT i.indisprimary
                AND NOT EXISTS (
                    SELECT 1 FROM pg_constraint con
                    WHERE con.conindid = i.indexrelid
                        AND con.contype IN ('p', 'u', 'x')
                )
            ORDER BY ic.relname
        "#;

        let index_rows = sqlx::query(indexes_query)
            .bind(oid)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(indexes_query, e))?;

        for index_row in index_rows {
            let name: String = index_row.try_get("name")?;
            let method: String = index_row.try_get("method")?;
            let columns: Vec<String> = index_row.try_get("columns")?;
            let descending: Vec<bool> = index_row.try_get("descending")?;

            let columns = columns
                .into_iter()
                .zip(descending)
                .map(|(name, descending)| IndexColumn { name, descending })
                .collect();
            table
                .indexes
                .push(Index::new(name, columns).with_method(method));
        }

        debug!(table = %table_name, columns = table.columns.len(), "reflected table");
        schema_index.add_table(table);
    }

    info!(tables = schema_index.tables.len(), "indexed PostgreSQL schema");
    Ok(schema_index)
}

/// Shorten `format_type` output to the common type names
/// (`character varying(255)` is `VARCHAR(255)`, `timestamp without time zone`
/// is `TIMESTAMP`)
fn postgres_type_name(formatted: &str) -> String {
    let upper = formatted.to_uppercase().replace(" WITHOUT TIME ZONE", "");
    for (long, short) in [("CHARACTER VARYING", "VARCHAR"), ("CHARACTER", "CHAR")] {
        if let Some(rest) = upper.strip_prefix(long) {
            if rest.is_empty() || rest.starts_with(['(', '[']) {
                return format!("{}{}", short, rest);
            }
        }
    }
    upper
}

/// Index MySQL database schema (tables of the connected database)
pub async fn index_mysql(pool: &MySqlPool) -> Result<SchemaIndex> {
    let mut schema_index = SchemaIndex::new();

    let db_row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT CONVERT(DATABASE() USING utf8)")
            .fetch_optional(pool)
            .await?;
    schema_index.database_name = db_row.and_then(|(name,)| name);

    let tables_query = r#"
        SELECT CONVERT(TABLE_NAME USING utf8) AS name
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    let tables_rows = sqlx::query(tables_query)
        .fetch_all(pool)
        .await
        .map_err(|e| DbdexError::db_query(tables_query, e))?;

    for row in tables_rows {
        let table_name: String = row.try_get("name")?;
        let mut table = Table::new(&table_name);

        let columns_query = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS name,
                CONVERT(UPPER(COLUMN_TYPE) USING utf8) AS data_type,
                CONVERT(IS_NULLABLE USING utf8) AS is_nullable,
                CONVERT(COLUMN_DEFAULT USING utf8) AS default_value,
                CONVERT(COLUMN_KEY USING utf8) AS column_key
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let columns_rows = sqlx::query(columns_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(columns_query, e))?;

        for col_row in columns_rows {
            let name: String = col_row.try_get("name")?;
            let data_type: String = col_row.try_get("data_type")?;
            let is_nullable: String = col_row.try_get("is_nullable")?;
            let default_value: Option<String> = col_row.try_get("default_value")?;
            let column_key: Option<String> = col_row.try_get("column_key")?;

            let mut column = Column::new(name, data_type);
            column.nullable = is_nullable == "YES";
            column.default_value = default_value;
            if column_key.as_deref() == Some("PRI") {
                column = column.primary_key();
            }
            table.add_column(column);
        }

        // One row per index column; grouped below
        let stats_query = r#"
            SELECT
                CONVERT(INDEX_NAME USING utf8) AS index_name,
                CONVERT(COLUMN_NAME USING utf8) AS column_name,
                CAST(NON_UNIQUE AS SIGNED) AS non_unique,
                CONVERT(COLLATION USING utf8) AS collation,
                CONVERT(INDEX_TYPE USING utf8) AS index_type
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let stats_rows = sqlx::query(stats_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(stats_query, e))?;

        let mut stats = Vec::with_capacity(stats_rows.len());
        for stat_row in stats_rows {
            stats.push(MySqlIndexStat {
                index_name: stat_row.try_get("index_name")?,
                column_name: stat_row.try_get("column_name")?,
                non_unique: stat_row.try_get::<i64, _>("non_unique")? != 0,
                descending: stat_row.try_get::<Option<String>, _>("collation")?.as_deref() == Some("D"),
                index_type: stat_row.try_get("index_type")?,
            });
        }
        apply_mysql_index_stats(&mut table, stats);

        let fk_query = r#"
            SELECT
                CONVERT(COLUMN_NAME USING utf8) AS column_name,
                CONVERT(REFERENCED_TABLE_NAME USING utf8) AS target_table,
                CONVERT(REFERENCED_COLUMN_NAME USING utf8) AS target_column
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
                AND TABLE_NAME = ?
                AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

        let fk_rows = sqlx::query(fk_query)
            .bind(&table_name)
            .fetch_all(pool)
            .await
            .map_err(|e| DbdexError::db_query(fk_query, e))?;

        for fk_row in fk_rows {
            let column_name: String = fk_row.try_get("column_name")?;
            let target_table: String = fk_row.try_get("target_table")?;
            let target_column: String = fk_row.try_get("target_column")?;
            table
                .constraints
                .push(Constraint::foreign_key(column_name, target_table, target_column));
        }

        debug!(table = %table_name, columns = table.columns.len(), "reflected table");
        schema_index.add_table(table);
    }

    info!(tables = schema_index.tables.len(), "indexed MySQL schema");
    Ok(schema_index)
}

/// One row of `information_schema.STATISTICS`
#[derive(Debug, Clone)]
struct MySqlIndexStat {
    index_name: String,
    column_name: Option<String>,
    non_unique: bool,
    descending: bool,
    index_type: String,
}

/// Group per-column statistics rows (ordered by index, then position) into
/// indexes and unique constraints; the primary key is skipped
fn apply_mysql_index_stats(table: &mut Table, stats: Vec<MySqlIndexStat>) {
    let mut groups: Vec<(MySqlIndexStat, Vec<IndexColumn>)> = Vec::new();

    for stat in stats {
        if stat.index_name == "PRIMARY" {
            continue;
        }
        let column = stat.column_name.clone().map(|name| IndexColumn {
            name,
            descending: stat.descending,
        });
        match groups.last_mut() {
            Some((head, columns)) if head.index_name == stat.index_name => {
                columns.extend(column);
            }
            _ => groups.push((stat, column.into_iter().collect())),
        }
    }

    for (head, columns) in groups {
        if head.non_unique {
            table.indexes.push(
                Index::new(head.index_name, columns).with_method(head.index_type.to_lowercase()),
            );
        } else {
            table
                .constraints
                .push(Constraint::unique(columns.into_iter().map(|c| c.name)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(index: &str, column: &str, non_unique: bool, descending: bool, kind: &str) -> MySqlIndexStat {
        MySqlIndexStat {
            index_name: index.to_string(),
            column_name: Some(column.to_string()),
            non_unique,
            descending,
            index_type: kind.to_string(),
        }
    }

    #[test]
    fn test_postgres_type_names() {
        assert_eq!(postgres_type_name("character varying(255)"), "VARCHAR(255)");
        assert_eq!(postgres_type_name("character varying"), "VARCHAR");
        assert_eq!(postgres_type_name("character(2)"), "CHAR(2)");
        assert_eq!(postgres_type_name("character varying[]"), "VARCHAR[]");
        assert_eq!(postgres_type_name("timestamp without time zone"), "TIMESTAMP");
        assert_eq!(postgres_type_name("timestamp(3) without time zone"), "TIMESTAMP(3)");
        assert_eq!(
            postgres_type_name("timestamp with time zone"),
            "TIMESTAMP WITH TIME ZONE"
        );
        assert_eq!(postgres_type_name("numeric(10,2)"), "NUMERIC(10,2)");
        assert_eq!(postgres_type_name("characteristic"), "CHARACTERISTIC");
    }

    #[test]
    fn test_mysql_stats_grouping() {
        let mut table = Table::new("orders");
        apply_mysql_index_stats(
            &mut table,
            vec![
                stat("PRIMARY", "id", false, false, "BTREE"),
                stat("ft_notes", "notes", true, false, "FULLTEXT"),
                stat("ix_customer_date", "customer_id", true, false, "BTREE"),
                stat("ix_customer_date", "placed_at", true, true, "BTREE"),
                stat("uq_reference", "reference", false, false, "BTREE"),
            ],
        );

        assert_eq!(table.indexes.len(), 2);
        assert_eq!(table.indexes[0].to_string(), "INDEX ft_notes (notes)");
        assert_eq!(
            table.indexes[1].to_string(),
            "INDEX ix_customer_date (customer_id ASC, placed_at DESC)"
        );
        assert_eq!(table.constraints, vec![Constraint::unique(["reference"])]);
    }

    #[tokio::test]
    async fn test_index_sqlite_in_memory() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        for statement in [
            "CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT NOT NULL, UNIQUE (name))",
            "CREATE TABLE users (id INTEGER PRIMARY KEY, team_id INTEGER REFERENCES teams, score REAL DEFAULT 0)",
            "CREATE INDEX ix_users_score ON users (score DESC, team_id)",
        ] {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }

        let index = index_sqlite(&pool).await.unwrap();
        assert_eq!(index.table_names(), vec!["teams", "users"]);

        let users = index.get_table("users").unwrap();
        assert!(users.get_column("id").unwrap().is_primary_key);
        assert!(!users.get_column("id").unwrap().nullable);
        assert_eq!(users.get_column("score").unwrap().default_value.as_deref(), Some("0"));
        assert_eq!(
            users.indexes[0].to_string(),
            "INDEX ix_users_score (score DESC, team_id ASC)"
        );
        assert_eq!(
            users.constraints,
            vec![Constraint::foreign_key("team_id", "teams", "id")]
        );

        let teams = index.get_table("teams").unwrap();
        assert!(teams.indexes.is_empty());
        assert_eq!(teams.constraints, vec![Constraint::unique(["name"])]);
    }
}
