//! SQLite connection handling.
//!
//! The pool is created lazily: opening the file is deferred to the first
//! statement, so `connect` never touches the disk and `ping` is the
//! explicit reachability check.

use super::type_mapping::sqlite_value;
use crate::Result;
use crate::error::DatafrostError;
use crate::models::QueryResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Column, Executor, Row, SqlitePool, Statement};
use std::path::Path;

/// Upper bound on pooled connections per database file.
const MAX_CONNECTIONS: u32 = 4;

/// Creates a lazy, read-only pool for the database file at `path`.
///
/// # Errors
/// Returns a configuration error for an empty path.
pub fn open_pool(path: &Path) -> Result<SqlitePool> {
    if path.as_os_str().is_empty() {
        return Err(DatafrostError::missing_field("path"));
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);

    Ok(SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_lazy_with(options))
}

/// Executes one statement with positional text arguments.
///
/// The statement is prepared first so column names are reported even when
/// no row comes back.
pub async fn fetch(pool: &SqlitePool, sql: &str, args: &[String]) -> Result<QueryResult> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| DatafrostError::query_failed("Failed to open SQLite database", e))?;

    let statement = (&mut *conn)
        .prepare(sql)
        .await
        .map_err(|e| DatafrostError::query_failed("Failed to prepare SQLite statement", e))?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();

    let mut query = sqlx::query(sql);
    for arg in args {
        query = query.bind(arg.as_str());
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DatafrostError::query_failed("SQLite query failed", e))?;

    let rows = rows
        .iter()
        .map(|row| (0..row.columns().len()).map(|i| sqlite_value(row, i)).collect())
        .collect();

    Ok(QueryResult::from_rows(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_pool_rejects_empty_path() {
        let err = open_pool(Path::new("")).unwrap_err();
        assert!(matches!(err, DatafrostError::MissingCredentialField { .. }));
    }

    #[tokio::test]
    async fn test_open_pool_is_lazy() {
        // A missing file only fails once a statement runs
        let pool = open_pool(Path::new("/nonexistent/datafrost/test.db")).unwrap();
        let result = fetch(&pool, "SELECT 1", &[]).await;
        assert!(result.is_err());
    }
}
