//! Scalar result values
//!
//! Rows coming back from any backend are flattened into [`Value`]s so that a
//! result can be rendered (markdown, CSV, terminal) and serialized for the model
//! without caring which driver produced it.
//!
//! Decoding classifies each value's reported type into a [`TypeCategory`] and
//! then tries the driver types for that category in turn.

use serde::{Serialize, Serializer};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use std::fmt;
use tracing::debug;

/// A single cell of a query result
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact numerics keep the database's textual representation
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            // whole floats keep their fractional part: 2.0, not 2
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(v) | Value::Text(v) => f.write_str(v),
            Value::Bytes(bytes) => {
                f.write_str("0x")?;
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::Float(v) => serializer.serialize_str(&v.to_string()),
            Value::Decimal(v) | Value::Text(v) => serializer.serialize_str(v),
            Value::Bytes(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Logical category for a driver-reported type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Unsigned,
    Float,
    Decimal,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Json,
    Uuid,
    Binary,
    Text,
}

/// Classify a type name as reported by sqlx (`INT8`, `BIGINT UNSIGNED`, `REAL`, ...)
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_ascii_lowercase();

    match lower.as_str() {
        "bool" | "boolean" => return TypeCategory::Boolean,
        "timestamptz" => return TypeCategory::TimestampTz,
        "timestamp" | "datetime" => return TypeCategory::Timestamp,
        "date" => return TypeCategory::Date,
        "time" => return TypeCategory::Time,
        "json" | "jsonb" => return TypeCategory::Json,
        "uuid" => return TypeCategory::Uuid,
        "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            return TypeCategory::Binary
        }
        _ => {}
    }

    if lower.contains("decimal") || lower.contains("numeric") {
        TypeCategory::Decimal
    } else if lower.contains("unsigned") {
        TypeCategory::Unsigned
    } else if (lower.contains("int") && lower != "interval") || lower.contains("serial") {
        TypeCategory::Integer
    } else if lower.contains("float") || lower.contains("double") || lower == "real" {
        TypeCategory::Float
    } else {
        TypeCategory::Text
    }
}

/// Conversion of a driver row into plain values
pub trait DecodeRow: Row {
    /// Column labels in select-list order
    fn column_names(&self) -> Vec<String> {
        self.columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect()
    }

    /// Every cell of the row in select-list order
    fn decode_values(&self) -> Vec<Value>;
}

fn get<'r, R, T>(row: &'r R, idx: usize) -> Option<T>
where
    R: Row,
    usize: ColumnIndex<R>,
    T: Decode<'r, R::Database> + Type<R::Database>,
{
    row.try_get::<T, usize>(idx).ok()
}

/// Reported type name of a non-null cell, `None` for SQL NULL
fn type_name_of<R>(row: &R, idx: usize) -> Option<String>
where
    R: Row,
    usize: ColumnIndex<R>,
{
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    Some(raw.type_info().name().to_string())
}

fn unsupported(type_name: &str, idx: usize) -> Value {
    debug!(column = idx, type_name, "unsupported column type");
    Value::Text(format!("<{}>", type_name))
}

impl DecodeRow for SqliteRow {
    fn decode_values(&self) -> Vec<Value> {
        (0..self.len()).map(|idx| decode_sqlite(self, idx)).collect()
    }
}

impl DecodeRow for PgRow {
    fn decode_values(&self) -> Vec<Value> {
        (0..self.len()).map(|idx| decode_postgres(self, idx)).collect()
    }
}

impl DecodeRow for MySqlRow {
    fn decode_values(&self) -> Vec<Value> {
        (0..self.len()).map(|idx| decode_mysql(self, idx)).collect()
    }
}

// SQLite reports the storage class of each value (INTEGER, REAL, TEXT, BLOB)
fn decode_sqlite(row: &SqliteRow, idx: usize) -> Value {
    let Some(type_name) = type_name_of(row, idx) else {
        return Value::Null;
    };

    let decoded = match categorize_type(&type_name) {
        TypeCategory::Integer | TypeCategory::Boolean => get::<_, i64>(row, idx).map(Value::Int),
        TypeCategory::Float | TypeCategory::Decimal => get::<_, f64>(row, idx).map(Value::Float),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(Value::Bytes),
        _ => get::<_, String>(row, idx).map(Value::Text),
    };

    decoded
        .or_else(|| get::<_, String>(row, idx).map(Value::Text))
        .or_else(|| get::<_, Vec<u8>>(row, idx).map(Value::Bytes))
        .unwrap_or_else(|| unsupported(&type_name, idx))
}

fn decode_postgres(row: &PgRow, idx: usize) -> Value {
    let Some(type_name) = type_name_of(row, idx) else {
        return Value::Null;
    };

    let decoded = match categorize_type(&type_name) {
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(Value::Bool),
        TypeCategory::Integer | TypeCategory::Unsigned => get::<_, i64>(row, idx)
            .or_else(|| get::<_, i32>(row, idx).map(i64::from))
            .or_else(|| get::<_, i16>(row, idx).map(i64::from))
            .map(Value::Int),
        TypeCategory::Float => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(Value::Float),
        TypeCategory::Decimal => get::<_, Decimal>(row, idx).map(|v| Value::Decimal(v.to_string())),
        TypeCategory::TimestampTz => {
            get::<_, DateTime<Utc>>(row, idx).map(|v| Value::Text(v.to_rfc3339()))
        }
        TypeCategory::Timestamp => get::<_, NaiveDateTime>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Date => get::<_, NaiveDate>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Time => get::<_, NaiveTime>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Json => get::<_, JsonValue>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Uuid => get::<_, Uuid>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(Value::Bytes),
        TypeCategory::Text => get::<_, String>(row, idx).map(Value::Text),
    };

    decoded
        .or_else(|| get::<_, String>(row, idx).map(Value::Text))
        .unwrap_or_else(|| unsupported(&type_name, idx))
}

fn decode_mysql(row: &MySqlRow, idx: usize) -> Value {
    let Some(type_name) = type_name_of(row, idx) else {
        return Value::Null;
    };

    let decoded = match categorize_type(&type_name) {
        TypeCategory::Boolean => get::<_, bool>(row, idx).map(Value::Bool),
        TypeCategory::Integer => get::<_, i64>(row, idx)
            .map(Value::Int)
            .or_else(|| get::<_, u64>(row, idx).map(Value::UInt)),
        TypeCategory::Unsigned => get::<_, u64>(row, idx)
            .map(Value::UInt)
            .or_else(|| get::<_, i64>(row, idx).map(Value::Int)),
        TypeCategory::Float => get::<_, f64>(row, idx)
            .or_else(|| get::<_, f32>(row, idx).map(f64::from))
            .map(Value::Float),
        TypeCategory::Decimal => get::<_, Decimal>(row, idx).map(|v| Value::Decimal(v.to_string())),
        TypeCategory::TimestampTz => {
            get::<_, DateTime<Utc>>(row, idx).map(|v| Value::Text(v.to_rfc3339()))
        }
        TypeCategory::Timestamp => get::<_, NaiveDateTime>(row, idx)
            .map(|v| Value::Text(v.to_string()))
            .or_else(|| get::<_, DateTime<Utc>>(row, idx).map(|v| Value::Text(v.to_rfc3339()))),
        TypeCategory::Date => get::<_, NaiveDate>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Time => get::<_, NaiveTime>(row, idx).map(|v| Value::Text(v.to_string())),
        TypeCategory::Json => get::<_, JsonValue>(row, idx).map(|v| Value::Text(v.to_string())),
        // binary collations report text columns as VARBINARY/BLOB
        TypeCategory::Binary => get::<_, Vec<u8>>(row, idx).map(|bytes| match String::from_utf8(bytes) {
            Ok(text) => Value::Text(text),
            Err(err) => Value::Bytes(err.into_bytes()),
        }),
        TypeCategory::Uuid | TypeCategory::Text => get::<_, String>(row, idx).map(Value::Text),
    };

    decoded
        .or_else(|| get::<_, String>(row, idx).map(Value::Text))
        .or_else(|| get::<_, Vec<u8>>(row, idx).map(Value::Bytes))
        .unwrap_or_else(|| unsupported(&type_name, idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Unsigned);
        assert_eq!(categorize_type("INTEGER"), TypeCategory::Integer);
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Text);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("REAL"), TypeCategory::Float);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Float);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("jsonb"), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Decimal("10.00".to_string()).to_string(), "10.00");
        assert_eq!(Value::Bytes(vec![0xde, 0xad, 0x01]).to_string(), "0xdead01");
    }

    #[test]
    fn test_serialize() {
        let row = vec![
            Value::Int(1),
            Value::Null,
            Value::from("Alice"),
            Value::Float(f64::NAN),
            Value::Bool(true),
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"[1,null,"Alice","NaN",true]"#);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".to_string()));
    }
}
