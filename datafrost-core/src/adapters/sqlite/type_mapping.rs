//! SQLite storage classes to canonical values.
//!
//! SQLite is dynamically typed: the declared column type is only an
//! affinity hint, so conversion follows the storage class of each value
//! (`NULL`, `INTEGER`, `REAL`, `TEXT`, `BLOB`) rather than the schema.
//! BLOBs become standard base64 text.

use crate::models::Value;
use base64::Engine;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, TypeInfo, ValueRef};

/// Converts column `index` of `row` into a canonical value.
pub fn sqlite_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" => integer(row, index),
        "REAL" | "FLOAT" | "DOUBLE" => real(row, index),
        "BOOLEAN" => row
            .try_get_unchecked::<bool, _>(index)
            .map(Value::Bool)
            .unwrap_or_else(|_| integer(row, index)),
        "BLOB" => blob(row, index),
        _ => text(row, index),
    }
}

fn integer(row: &SqliteRow, index: usize) -> Value {
    row.try_get_unchecked::<i64, _>(index)
        .map(Value::Integer)
        .unwrap_or_else(|_| text(row, index))
}

fn real(row: &SqliteRow, index: usize) -> Value {
    row.try_get_unchecked::<f64, _>(index)
        .map(Value::Float)
        .unwrap_or_else(|_| text(row, index))
}

fn blob(row: &SqliteRow, index: usize) -> Value {
    row.try_get_unchecked::<Vec<u8>, _>(index)
        .map(|bytes| Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
        .unwrap_or(Value::Null)
}

fn text(row: &SqliteRow, index: usize) -> Value {
    if let Ok(s) = row.try_get_unchecked::<String, _>(index) {
        return Value::String(s);
    }
    // Invalid UTF-8 stored as TEXT is surfaced like a BLOB
    blob(row, index)
}
