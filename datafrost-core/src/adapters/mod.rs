//! Database adapter contract, registry and connection cache.
//!
//! Every supported backend implements [`DatabaseAdapter`]; callers only ever
//! hold an `Arc<dyn DatabaseAdapter>` and never learn which backend they are
//! talking to. Adapters are created unconnected by the [`AdapterRegistry`]
//! and kept alive per logical connection by the [`AdapterCache`].
//!
//! # Module Structure
//! - `config`: credential parsing (`Credentials`, `CredentialMap`)
//! - `filter`: filter to WHERE-clause compilation
//! - `helpers`: read-only guard, identifier quoting, connection slot
//! - `registry`: type tag → constructor + UI metadata
//! - `cache`: logical connection ID → live adapter
//! - Backend modules (sqlite, turso, postgres, bigquery, snowflake)

use crate::Result;
use crate::models::{QueryResult, TableInfo, TableSchema, TreeNode};
use async_trait::async_trait;

pub mod cache;
pub mod config;
pub mod filter;
pub mod helpers;
pub mod registry;

pub use cache::AdapterCache;
pub use config::{BackendKind, CredentialMap, Credentials};
pub use filter::{Filter, FilterOperator, WhereClause, binds_arguments, build_where_clause};
pub use registry::{AdapterFactory, AdapterRegistration, AdapterRegistry};

/// Optional capabilities an adapter may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFeature {
    /// Native database → schema → table hierarchy
    CatalogTree,
    /// Index metadata in `get_table_schema`
    Indexes,
    /// Constraint metadata in `get_table_schema`
    Constraints,
    /// `PRAGMA` statements accepted by `execute_query`
    PragmaStatements,
    /// Driver-managed connection pool shared by concurrent callers
    ConnectionPooling,
    /// Backend session itself enforces read-only transactions
    ReadOnlySession,
}

/// Uniform contract every backend implements.
///
/// # Lifecycle
/// An adapter is constructed empty, populated by [`connect`], used for any
/// number of operations and released by [`close`]. Once closed it cannot be
/// connected again. Every operation other than `connect` and `close` fails
/// with `NotConnected` before a successful `connect`.
///
/// # Concurrency
/// A connected adapter is shared by reference across concurrent callers;
/// implementations rely on their driver (pool or HTTP client) for safe
/// concurrent use and add no per-adapter query locking.
///
/// # Object Safety
/// The trait is object-safe and is used through `Arc<dyn DatabaseAdapter>`.
///
/// [`connect`]: DatabaseAdapter::connect
/// [`close`]: DatabaseAdapter::close
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Backend family, used to validate credentials for this adapter.
    fn backend(&self) -> BackendKind;

    /// Opens the backend connection from already validated credentials.
    ///
    /// Opening may be lazy; [`ping`](DatabaseAdapter::ping) is the explicit
    /// reachability check.
    ///
    /// # Errors
    /// `InvalidCredentialShape` for another backend's credentials,
    /// `ConnectionFailed` when the backend refuses the connection.
    async fn connect(&self, credentials: &Credentials) -> Result<()>;

    /// Verifies the backend answers.
    ///
    /// # Errors
    /// `NotConnected` before `connect`, `Unreachable` when the backend
    /// does not respond.
    async fn ping(&self) -> Result<()>;

    /// Releases the connection. Idempotent and safe on an unconnected adapter.
    async fn close(&self) -> Result<()>;

    /// Lists user tables and views, excluding system catalog objects.
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// Fetches one page of `table` matching `filters`.
    ///
    /// `total` counts every matching row regardless of paging and
    /// `page = offset / limit + 1`.
    async fn get_table_data(
        &self,
        table: &str,
        limit: u32,
        offset: u32,
        filters: &[Filter],
    ) -> Result<QueryResult>;

    /// Runs ad-hoc SQL that passes the read-only keyword allow-list.
    ///
    /// # Errors
    /// `RejectedStatement` (without touching the backend) for anything
    /// else, `QueryExecution` for backend failures.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Best-effort structural description of `table`.
    async fn get_table_schema(&self, table: &str) -> Result<TableSchema>;

    /// Checks if the adapter supports a specific feature.
    fn supports_feature(&self, feature: AdapterFeature) -> bool;

    /// Hierarchical listing capability, when the backend has one.
    fn as_tree_lister(&self) -> Option<&dyn TreeLister> {
        None
    }
}

/// Backends exposing a multi-level catalog (database → schema → table).
#[async_trait]
pub trait TreeLister: Send + Sync {
    /// Returns the catalog hierarchy visible to the session.
    async fn list_tree(&self) -> Result<Vec<TreeNode>>;
}

/// Lists the catalog tree of any adapter.
///
/// Adapters without a native hierarchy get a single-level tree built from
/// [`DatabaseAdapter::list_tables`].
pub async fn list_tree(adapter: &dyn DatabaseAdapter) -> Result<Vec<TreeNode>> {
    match adapter.as_tree_lister() {
        Some(lister) => lister.list_tree().await,
        None => Ok(TreeNode::from_tables(adapter.list_tables().await?)),
    }
}

/// Validates a stored credential map for `adapter` and connects it.
pub async fn connect_with_map(adapter: &dyn DatabaseAdapter, credentials: &CredentialMap) -> Result<()> {
    let credentials = Credentials::parse(adapter.backend(), credentials)?;
    adapter.connect(&credentials).await
}

/// Safely redacts credentials from database connection URLs.
///
/// Delegates to [`crate::error::redact_database_url`].
#[inline]
pub fn redact_database_url(url: &str) -> String {
    crate::error::redact_database_url(url)
}

// SQL shared by the SQLite-family backends
#[cfg(any(feature = "sqlite", feature = "turso"))]
pub mod sqlite_family;

// Backend adapter modules
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "turso")]
pub mod turso;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "bigquery")]
pub mod bigquery;

#[cfg(feature = "snowflake")]
pub mod snowflake;
