//! Turso (hosted libSQL) adapter.
//!
//! Statements travel over Hrana-over-HTTP; see [`hrana`]. The SQL dialect
//! is SQLite's, so listing, paging and introspection reuse
//! [`sqlite_family`](super::sqlite_family).

pub mod hrana;

use super::config::{BackendKind, Credentials};
use super::helpers::ConnectionSlot;
use super::registry::AdapterRegistration;
use super::sqlite_family::{self, SqliteExecutor};
use super::{AdapterFeature, DatabaseAdapter, Filter};
use crate::Result;
use crate::error::DatafrostError;
use crate::models::{AdapterInfo, FieldConfig, QueryResult, TableInfo, TableSchema, UiConfig};
use async_trait::async_trait;
use hrana::HranaClient;

/// Turso adapter over a remote libSQL database.
#[derive(Default)]
pub struct TursoAdapter {
    client: ConnectionSlot<HranaClient>,
}

impl std::fmt::Debug for TursoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TursoAdapter")
            .field("connected", &self.client.is_open())
            .finish()
    }
}

impl TursoAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Registry entry for the `turso` type tag.
pub fn registration() -> AdapterRegistration {
    AdapterRegistration::new(
        AdapterInfo {
            adapter_type: BackendKind::Turso.type_tag().to_string(),
            name: "Turso".to_string(),
            description: "Turso (libSQL) SQLite database".to_string(),
            ui_config: UiConfig {
                fields: vec![
                    FieldConfig::required("url", "Database URL", "text", "libsql://..."),
                    FieldConfig::required("token", "Auth Token", "password", "your-auth-token"),
                ],
                ..Default::default()
            },
        },
        TursoAdapter::new,
    )
}

#[async_trait]
impl SqliteExecutor for TursoAdapter {
    async fn fetch(&self, sql: &str, args: &[String]) -> Result<QueryResult> {
        self.client.get()?.execute(sql, args).await
    }
}

#[async_trait]
impl DatabaseAdapter for TursoAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Turso
    }

    async fn connect(&self, credentials: &Credentials) -> Result<()> {
        let Credentials::Turso(turso) = credentials else {
            return Err(credentials.mismatch(BackendKind::Turso));
        };

        let client = HranaClient::new(&turso.url, turso.token.clone())?;
        tracing::debug!("Turso client prepared: {:?}", client);
        self.client.install(client)?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client.get()?;
        client
            .execute("SELECT 1", &[])
            .await
            .map_err(|e| DatafrostError::unreachable("Turso database did not answer", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Every pipeline closes its own stream; dropping the client is enough
        if self.client.take().is_some() {
            tracing::debug!("Turso client released");
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
            AdapterFeature::Indexes | AdapterFeature::Constraints | AdapterFeature::PragmaStatements
        )
    }
}
