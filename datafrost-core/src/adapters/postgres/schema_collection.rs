//! Table listing and structural introspection for the `public` schema.

use crate::Result;
use crate::error::DatafrostError;
use crate::models::{ColumnInfo, ConstraintInfo, IndexInfo, TableInfo, TableKind, TableSchema};
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};

/// Schema browsed by the adapter.
pub const BROWSED_SCHEMA: &str = "public";

pub(crate) async fn list_tables(pool: &PgPool) -> Result<Vec<TableInfo>> {
    let query = r#"
        SELECT table_name::text AS name, table_type::text AS kind
        FROM information_schema.tables
        WHERE table_schema = $1
        ORDER BY table_name
    "#;

    let rows = sqlx::query(query)
        .bind(BROWSED_SCHEMA)
        .fetch_all(pool)
        .await
        .map_err(|e| DatafrostError::query_failed("Failed to list PostgreSQL tables", e))?;

    rows.iter()
        .map(|row| {
            let name: String = row
                .try_get("name")
                .map_err(|e| DatafrostError::query_failed("Failed to read table name", e))?;
            let kind: String = row.try_get("kind").unwrap_or_default();
            Ok(TableInfo::new(name, TableKind::from_catalog(&kind)))
        })
        .collect()
}

/// Declared type of every column of `table`, as `format_type` spells it.
///
/// The spelling is valid SQL and is used to cast filter arguments.
pub(crate) async fn column_types(pool: &PgPool, table: &str) -> Result<HashMap<String, String>> {
    let query = r#"
        SELECT a.attname::text AS column_name,
               format_type(a.atttypid, a.atttypmod) AS data_type
        FROM pg_attribute a
        JOIN pg_class c ON c.oid = a.attrelid
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2
          AND a.attnum > 0 AND NOT a.attisdropped
    "#;

    let rows = sqlx::query(query)
        .bind(BROWSED_SCHEMA)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            DatafrostError::query_failed(
                format!("Failed to read column types for table '{}'", table),
                e,
            )
        })?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let name: String = row.try_get("column_name").ok()?;
            let data_type: String = row.try_get("data_type").ok()?;
            Some((name, data_type))
        })
        .collect())
}

/// Columns, primary key, indexes and constraints of `table`.
///
/// Columns and the primary key are required; index and constraint
/// metadata are skipped with a warning when their catalog query fails.
pub(crate) async fn collect_table_schema(pool: &PgPool, table: &str) -> Result<TableSchema> {
    let mut schema = TableSchema::new(table);

    let primary_key = collect_primary_key(pool, table).await?;
    schema.columns = collect_columns(pool, table)
        .await?
        .into_iter()
        .map(|mut column| {
            column.is_primary_key = primary_key.contains(&column.name);
            column
        })
        .collect();

    match collect_indexes(pool, table).await {
        Ok(indexes) => schema.indexes = indexes,
        Err(e) => tracing::warn!("Skipping indexes for table '{}': {}", table, e),
    }
    match collect_constraints(pool, table).await {
        Ok(constraints) => schema.constraints = constraints,
        Err(e) => tracing::warn!("Skipping constraints for table '{}': {}", table, e),
    }

    Ok(schema)
}

async fn collect_columns(pool: &PgPool, table: &str) -> Result<Vec<ColumnInfo>> {
    let query = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            is_nullable = 'YES' AS nullable,
            column_default::text AS column_default
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
    "#;

    let rows = sqlx::query(query)
        .bind(BROWSED_SCHEMA)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            DatafrostError::query_failed(format!("Failed to get columns for table '{}'", table), e)
        })?;

    rows.iter()
        .map(|row| {
            Ok(ColumnInfo {
                name: row.try_get("column_name").map_err(read_failed)?,
                data_type: row.try_get("data_type").map_err(read_failed)?,
                nullable: row.try_get("nullable").map_err(read_failed)?,
                default_value: row.try_get("column_default").map_err(read_failed)?,
                is_primary_key: false,
            })
        })
        .collect()
}

async fn collect_primary_key(pool: &PgPool, table: &str) -> Result<HashSet<String>> {
    let query = r#"
        SELECT kcu.column_name::text AS column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_schema = $1
            AND tc.table_name = $2
            AND tc.constraint_type = 'PRIMARY KEY'
    "#;

    let rows = sqlx::query(query)
        .bind(BROWSED_SCHEMA)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            DatafrostError::query_failed(
                format!("Failed to get primary key for table '{}'", table),
                e,
            )
        })?;

    rows.iter()
        .map(|row| row.try_get::<String, _>("column_name").map_err(read_failed))
        .collect()
}

async fn collect_indexes(pool: &PgPool, table: &str) -> Result<Vec<IndexInfo>> {
    let query = r#"
        SELECT
            i.relname::text AS index_name,
            ix.indisunique AS is_unique,
            array_agg(a.attname::text ORDER BY array_position(ix.indkey::int2[], a.attnum)) AS columns
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        WHERE n.nspname = $1 AND t.relname = $2
        GROUP BY i.relname, ix.indisunique
        ORDER BY i.relname
    "#;

    let rows = sqlx::query(query)
        .bind(BROWSED_SCHEMA)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            DatafrostError::query_failed(format!("Failed to get indexes for table '{}'", table), e)
        })?;

    rows.iter()
        .map(|row| {
            Ok(IndexInfo {
                name: row.try_get("index_name").map_err(read_failed)?,
                unique: row.try_get("is_unique").map_err(read_failed)?,
                columns: row.try_get("columns").map_err(read_failed)?,
            })
        })
        .collect()
}

async fn collect_constraints(pool: &PgPool, table: &str) -> Result<Vec<ConstraintInfo>> {
    // Single-column constraints report their column; composite ones leave it empty
    let query = r#"
        SELECT
            con.conname::text AS constraint_name,
            con.contype::text AS constraint_type,
            pg_get_constraintdef(con.oid) AS definition,
            CASE WHEN array_length(con.conkey, 1) = 1 THEN (
                SELECT a.attname::text FROM pg_attribute a
                WHERE a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
            ) END AS column_name
        FROM pg_constraint con
        JOIN pg_class t ON t.oid = con.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        WHERE n.nspname = $1 AND t.relname = $2
            AND con.contype IN ('f', 'u', 'c')
        ORDER BY con.conname
    "#;

    let rows = sqlx::query(query)
        .bind(BROWSED_SCHEMA)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            DatafrostError::query_failed(
                format!("Failed to get constraints for table '{}'", table),
                e,
            )
        })?;

    rows.iter()
        .map(|row| {
            let code: String = row.try_get("constraint_type").map_err(read_failed)?;
            let column: Option<String> = row.try_get("column_name").map_err(read_failed)?;
            Ok(ConstraintInfo {
                name: row.try_get("constraint_name").map_err(read_failed)?,
                kind: constraint_kind(&code).to_string(),
                column: column.unwrap_or_default(),
                definition: row.try_get("definition").map_err(read_failed)?,
            })
        })
        .collect()
}

/// Spells a `pg_constraint.contype` code.
pub fn constraint_kind(code: &str) -> &'static str {
    match code {
        "f" => "FOREIGN KEY",
        "u" => "UNIQUE",
        "c" => "CHECK",
        "p" => "PRIMARY KEY",
        "x" => "EXCLUDE",
        _ => "OTHER",
    }
}

fn read_failed(error: sqlx::Error) -> DatafrostError {
    DatafrostError::query_failed("Failed to read catalog row", error)
}
