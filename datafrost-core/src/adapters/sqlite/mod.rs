//! SQLite file adapter.
//!
//! # Module Structure
//! - `connection`: read-only pool creation for a database file
//! - `type_mapping`: SQLite storage classes to canonical values
//!
//! Listing, paging and `PRAGMA` introspection are shared with Turso through
//! [`sqlite_family`](super::sqlite_family).
//!
//! # Security Guarantees
//! - Database files are opened read-only and never created
//! - Ad-hoc SQL limited to `SELECT`, `WITH` and `PRAGMA`

pub mod connection;
pub mod type_mapping;

#[cfg(test)]
mod tests;

use super::config::{BackendKind, Credentials};
use super::helpers::ConnectionSlot;
use super::registry::AdapterRegistration;
use super::sqlite_family::{self, SqliteExecutor};
use super::{AdapterFeature, DatabaseAdapter, Filter};
use crate::Result;
use crate::error::DatafrostError;
use crate::models::{AdapterInfo, FieldConfig, QueryResult, TableInfo, TableSchema, UiConfig};
use async_trait::async_trait;
use sqlx::SqlitePool;

pub use type_mapping::sqlite_value;

/// SQLite adapter over a local database file.
#[derive(Default)]
pub struct SqliteAdapter {
    pool: ConnectionSlot<SqlitePool>,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("connected", &self.pool.is_open())
            .finish()
    }
}

impl SqliteAdapter {
    /// Creates an unconnected adapter.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registry entry for the `sqlite` type tag.
pub fn registration() -> AdapterRegistration {
    AdapterRegistration::new(
        AdapterInfo {
            adapter_type: BackendKind::Sqlite.type_tag().to_string(),
            name: "SQLite File".to_string(),
            description: "Local SQLite database file".to_string(),
            ui_config: UiConfig {
                fields: vec![FieldConfig::required(
                    "path",
                    "Database File Path",
                    "text",
                    "/path/to/database.db or ./relative/path.db",
                )],
                supports_file: true,
                file_types: vec![".db".to_string(), ".sqlite".to_string(), ".sqlite3".to_string()],
                ..Default::default()
            },
        },
        SqliteAdapter::new,
    )
}

#[async_trait]
impl SqliteExecutor for SqliteAdapter {
    async fn fetch(&self, sql: &str, args: &[String]) -> Result<QueryResult> {
        connection::fetch(&self.pool.get()?, sql, args).await
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn connect(&self, credentials: &Credentials) -> Result<()> {
        let Credentials::Sqlite(sqlite) = credentials else {
            return Err(credentials.mismatch(BackendKind::Sqlite));
        };

        let pool = connection::open_pool(&sqlite.path)?;
        if let Some(previous) = self.pool.install(pool)? {
            previous.close().await;
        }
        tracing::debug!("SQLite pool prepared for {}", sqlite.path.display());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let pool = self.pool.get()?;
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| DatafrostError::unreachable("SQLite database did not answer", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            tracing::debug!("SQLite pool closed");
        }
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        sqlite_family::list_tables(self).await
    }

    async fn get_table_data(
        &self,
        table: &str,
        limit: u32,
        offset: u32,
        filters: &[Filter],
    ) -> Result<QueryResult> {
        sqlite_family::get_table_data(self, table, limit, offset, filters).await
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        sqlite_family::execute_query(self, sql).await
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        sqlite_family::get_table_schema(self, table).await
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::Indexes
                | AdapterFeature::Constraints
                | AdapterFeature::PragmaStatements
                | AdapterFeature::ConnectionPooling
                | AdapterFeature::ReadOnlySession
        )
        // SQLite files have no catalog hierarchy
    }
}
