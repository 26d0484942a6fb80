//! Browsing operations keyed by logical connection ID.
//!
//! [`BrowserService`] resolves an ID through the [`ConnectionStore`], gets
//! the live adapter from the [`AdapterCache`] and runs the requested
//! operation. Request handlers (or the CLI) only ever talk to this type.

use crate::Result;
use crate::adapters::config::CredentialMap;
use crate::adapters::{AdapterCache, AdapterRegistry, DatabaseAdapter, Filter, list_tree};
use crate::error::DatafrostError;
use crate::models::{AdapterInfo, ConnectionId, QueryResult, TableInfo, TableSchema, TreeNode};
use crate::store::{ConnectionRecord, ConnectionStore};
use std::sync::Arc;

/// Rows per page when the caller does not say.
pub const DEFAULT_PAGE_LIMIT: u32 = 25;

/// One page request for [`BrowserService::get_table_data`].
///
/// Zero or absent `limit` and `page` fall back to 25 and 1.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub filters: Vec<Filter>,
}

impl PageRequest {
    pub fn new(limit: Option<u32>, page: Option<u32>) -> Self {
        Self {
            limit,
            page,
            filters: Vec::new(),
        }
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Parses the JSON-encoded filter list carried in a request parameter.
    ///
    /// # Errors
    /// `Serialization` when the text is not a JSON array of filters.
    pub fn with_filters_json(self, text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(self);
        }
        let filters = serde_json::from_str(text)
            .map_err(|e| DatafrostError::serialization("invalid filters parameter", e))?;
        Ok(self.with_filters(filters))
    }

    pub fn limit(&self) -> u32 {
        self.limit.filter(|&n| n > 0).unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    pub fn page(&self) -> u32 {
        self.page.filter(|&n| n > 0).unwrap_or(1)
    }

    /// `(page - 1) * limit`, saturating.
    pub fn offset(&self) -> u32 {
        self.page().saturating_sub(1).saturating_mul(self.limit())
    }
}

/// Store + cache front door for browsing saved connections.
pub struct BrowserService {
    store: Arc<dyn ConnectionStore>,
    cache: AdapterCache,
}

impl std::fmt::Debug for BrowserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserService")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl BrowserService {
    pub fn new(store: Arc<dyn ConnectionStore>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            store,
            cache: AdapterCache::new(registry),
        }
    }

    pub fn cache(&self) -> &AdapterCache {
        &self.cache
    }

    /// Every registered adapter descriptor, sorted by type tag.
    pub fn list_adapters(&self) -> Vec<AdapterInfo> {
        let mut adapters = self.cache.registry().list_adapters();
        adapters.sort_by(|a, b| a.adapter_type.cmp(&b.adapter_type));
        adapters
    }

    /// The stored record for `id`.
    ///
    /// # Errors
    /// `ConnectionNotFound` for an unknown ID.
    pub async fn connection(&self, id: ConnectionId) -> Result<ConnectionRecord> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or(DatafrostError::ConnectionNotFound { id })
    }

    async fn adapter(&self, id: ConnectionId) -> Result<Arc<dyn DatabaseAdapter>> {
        let record = self.connection(id).await?;
        self.cache
            .get(record.id, &record.adapter_type, &record.credentials)
            .await
    }

    pub async fn list_tables(&self, id: ConnectionId) -> Result<Vec<TableInfo>> {
        self.adapter(id).await?.list_tables().await
    }

    /// Native catalog tree, or a single level built from `list_tables`.
    pub async fn list_tree(&self, id: ConnectionId) -> Result<Vec<TreeNode>> {
        let adapter = self.adapter(id).await?;
        list_tree(adapter.as_ref()).await
    }

    pub async fn get_table_data(
        &self,
        id: ConnectionId,
        table: &str,
        request: &PageRequest,
    ) -> Result<QueryResult> {
        let adapter = self.adapter(id).await?;
        tracing::debug!(
            "Fetching page {} of '{}' on connection {} ({} filter(s))",
            request.page(),
            table,
            id,
            request.filters.len()
        );
        adapter
            .get_table_data(table, request.limit(), request.offset(), &request.filters)
            .await
    }

    pub async fn get_table_schema(&self, id: ConnectionId, table: &str) -> Result<TableSchema> {
        self.adapter(id).await?.get_table_schema(table).await
    }

    /// Runs read-only ad-hoc SQL.
    ///
    /// # Errors
    /// `Configuration` for a blank query (checked before the store is
    /// consulted), otherwise whatever the adapter reports.
    pub async fn execute_query(&self, id: ConnectionId, sql: &str) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(DatafrostError::configuration("query is required"));
        }
        self.adapter(id).await?.execute_query(sql).await
    }

    /// Tests unsaved credentials without touching the cache.
    pub async fn test_connection(&self, adapter_type: &str, credentials: &CredentialMap) -> Result<()> {
        if adapter_type.trim().is_empty() {
            return Err(DatafrostError::configuration("type is required"));
        }
        self.cache
            .registry()
            .test_connection(adapter_type, credentials)
            .await
    }

    /// Tests a saved connection with a fresh adapter, bypassing the cache.
    pub async fn test_existing(&self, id: ConnectionId) -> Result<()> {
        let record = self.connection(id).await?;
        self.test_connection(&record.adapter_type, &record.credentials)
            .await
    }

    /// Drops the cached adapter after the record's type or credentials changed.
    pub async fn connection_updated(&self, id: ConnectionId) {
        self.cache.invalidate(id).await;
    }

    /// Drops the cached adapter of a deleted record.
    pub async fn connection_deleted(&self, id: ConnectionId) {
        self.cache.invalidate(id).await;
    }

    /// Closes every cached adapter.
    pub async fn shutdown(&self) {
        self.cache.close().await;
    }
}
