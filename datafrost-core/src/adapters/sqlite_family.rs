//! SQL shared by SQLite-dialect backends (local files and libSQL/Turso).
//!
//! Both backends speak the same dialect and expose the same catalog
//! (`sqlite_master` plus `PRAGMA` introspection); they only differ in how a
//! statement reaches the engine. That difference is the [`SqliteExecutor`]
//! seam; everything else lives here.

use super::filter::{Filter, QuestionMarkDialect, build_where_clause};
use super::helpers::{
    SQLITE_READ_ONLY_KEYWORDS, count_total, ensure_read_only, escape_literal, quote_double,
};
use crate::Result;
use crate::models::{
    ColumnInfo, ConstraintInfo, IndexInfo, QueryResult, TableInfo, TableKind, TableSchema, Value,
};
use async_trait::async_trait;

/// Catalog query shared by every SQLite-family backend.
pub const LIST_TABLES_SQL: &str = "SELECT name, type FROM sqlite_master \
     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Runs one statement against a SQLite-dialect engine.
#[async_trait]
pub trait SqliteExecutor: Send + Sync {
    /// Executes `sql` with positional text arguments and returns all rows.
    async fn fetch(&self, sql: &str, args: &[String]) -> Result<QueryResult>;
}

/// Column lookup by name over a fetched result.
struct Rows<'a> {
    result: &'a QueryResult,
}

impl<'a> Rows<'a> {
    fn new(result: &'a QueryResult) -> Self {
        Self { result }
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.result
            .columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
    }

    fn text(&self, row: &[Value], column: &str) -> Option<String> {
        let value = row.get(self.index(column)?)?;
        match value {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn int(&self, row: &[Value], column: &str) -> i64 {
        self.index(column)
            .and_then(|i| row.get(i))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }
}

/// Lists user tables and views, skipping `sqlite_%` internals.
pub async fn list_tables(executor: &dyn SqliteExecutor) -> Result<Vec<TableInfo>> {
    let result = executor.fetch(LIST_TABLES_SQL, &[]).await?;
    let rows = Rows::new(&result);

    Ok(result
        .rows
        .iter()
        .filter_map(|row| {
            let name = rows.text(row, "name")?;
            let kind = TableKind::from_catalog(&rows.text(row, "type").unwrap_or_default());
            Some(TableInfo::new(name, kind))
        })
        .collect())
}

/// Counts matching rows, then fetches one page.
pub async fn get_table_data(
    executor: &dyn SqliteExecutor,
    table: &str,
    limit: u32,
    offset: u32,
    filters: &[Filter],
) -> Result<QueryResult> {
    let clause = build_where_clause(filters, &QuestionMarkDialect);
    let from = format!("FROM {}{}", quote_double(table), clause.to_sql_suffix());

    let count_sql = format!("SELECT COUNT(*) AS count {}", from);
    tracing::debug!("Counting rows: {}", count_sql);
    let counted = executor.fetch(&count_sql, &clause.args).await?;
    let total = count_total(&counted, table)?;

    let page_sql = format!("SELECT * {} LIMIT {} OFFSET {}", from, limit, offset);
    tracing::debug!("Fetching page: {}", page_sql);
    let page = executor.fetch(&page_sql, &clause.args).await?;

    Ok(page.with_pagination(total, limit, offset))
}

/// Runs ad-hoc SQL after the SQLite-family allow-list (`SELECT`, `WITH`, `PRAGMA`).
pub async fn execute_query(executor: &dyn SqliteExecutor, sql: &str) -> Result<QueryResult> {
    ensure_read_only(sql, SQLITE_READ_ONLY_KEYWORDS)?;
    let result = executor.fetch(sql, &[]).await?;
    Ok(QueryResult::from_rows(result.columns, result.rows))
}

/// Collects columns, indexes and foreign keys via `PRAGMA` introspection.
///
/// Column metadata is required; index column lists and foreign keys are
/// best-effort and skipped with a warning when their pragma fails.
pub async fn get_table_schema(executor: &dyn SqliteExecutor, table: &str) -> Result<TableSchema> {
    let escaped = escape_literal(table);
    let mut schema = TableSchema::new(table);

    let result = executor
        .fetch(&format!("PRAGMA table_info('{}')", escaped), &[])
        .await?;
    let rows = Rows::new(&result);
    schema.columns = result
        .rows
        .iter()
        .map(|row| ColumnInfo {
            name: rows.text(row, "name").unwrap_or_default(),
            data_type: rows.text(row, "type").unwrap_or_default(),
            nullable: rows.int(row, "notnull") == 0,
            default_value: rows.text(row, "dflt_value"),
            is_primary_key: rows.int(row, "pk") > 0,
        })
        .collect();

    let result = executor
        .fetch(&format!("PRAGMA index_list('{}')", escaped), &[])
        .await?;
    let rows = Rows::new(&result);
    for row in &result.rows {
        let Some(name) = rows.text(row, "name") else {
            continue;
        };
        let columns = match index_columns(executor, &name).await {
            Ok(columns) => columns,
            Err(e) => {
                tracing::warn!("Skipping columns of index '{}': {}", name, e);
                Vec::new()
            }
        };
        schema.indexes.push(IndexInfo {
            name,
            unique: rows.int(row, "unique") == 1,
            columns,
        });
    }

    match foreign_keys(executor, table).await {
        Ok(constraints) => schema.constraints = constraints,
        Err(e) => tracing::warn!("Skipping foreign keys of table '{}': {}", table, e),
    }

    Ok(schema)
}

async fn index_columns(executor: &dyn SqliteExecutor, index: &str) -> Result<Vec<String>> {
    let result = executor
        .fetch(&format!("PRAGMA index_info('{}')", escape_literal(index)), &[])
        .await?;
    let rows = Rows::new(&result);

    let mut columns: Vec<(i64, String)> = result
        .rows
        .iter()
        .filter_map(|row| Some((rows.int(row, "seqno"), rows.text(row, "name")?)))
        .filter(|(_, name)| !name.is_empty())
        .collect();
    columns.sort_by_key(|(seqno, _)| *seqno);
    Ok(columns.into_iter().map(|(_, name)| name).collect())
}

async fn foreign_keys(executor: &dyn SqliteExecutor, table: &str) -> Result<Vec<ConstraintInfo>> {
    let result = executor
        .fetch(
            &format!("PRAGMA foreign_key_list('{}')", escape_literal(table)),
            &[],
        )
        .await?;
    let rows = Rows::new(&result);

    Ok(result
        .rows
        .iter()
        .map(|row| {
            let id = rows.int(row, "id");
            let column = rows.text(row, "from").unwrap_or_default();
            let target_table = rows.text(row, "table").unwrap_or_default();
            let mut definition = format!(
                "FOREIGN KEY ({}) REFERENCES {}",
                quote_double(&column),
                quote_double(&target_table)
            );
            // `to` is NULL when the reference targets the primary key implicitly
            if let Some(target_column) = rows.text(row, "to") {
                definition.push_str(&format!(" ({})", quote_double(&target_column)));
            }
            for (clause, key) in [("ON UPDATE", "on_update"), ("ON DELETE", "on_delete")] {
                if let Some(action) = rows.text(row, key)
                    && action != "NO ACTION"
                {
                    definition.push_str(&format!(" {} {}", clause, action));
                }
            }
            ConstraintInfo {
                name: format!("fk_{}_{}", table, id),
                kind: "FOREIGN KEY".to_string(),
                column,
                definition,
            }
        })
        .collect())
}
