//! Core library for Datafrost, a read-only database browser.
//!
//! One [`DatabaseAdapter`] contract covers SQLite, Turso (libSQL),
//! PostgreSQL, BigQuery and Snowflake. The [`AdapterRegistry`] builds
//! adapters by type tag, the [`AdapterCache`] keeps one live adapter per
//! saved connection, and the [`BrowserService`] ties both to a
//! [`ConnectionStore`].
//!
//! # Security Guarantees
//! - Ad-hoc SQL must start with a read-only keyword before it reaches a driver
//! - Filter values are bound as parameters on every backend
//! - Credentials are validated once, held in zeroizing buffers and never logged
//!
//! # Example
//! ```rust,no_run
//! use datafrost_core::{AdapterRegistry, BrowserService, MemoryConnectionStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> datafrost_core::Result<()> {
//! let store = Arc::new(MemoryConnectionStore::new());
//! let service = BrowserService::new(store, Arc::new(AdapterRegistry::with_defaults()));
//! let tables = service.list_tables(1).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use adapters::{
    AdapterCache, AdapterFeature, AdapterRegistry, BackendKind, CredentialMap, Credentials,
    DatabaseAdapter, Filter, FilterOperator, TreeLister,
};
pub use error::{DatafrostError, ErrorCategory, Result};
pub use models::{
    AdapterInfo, ColumnInfo, ConnectionId, ConstraintInfo, IndexInfo, NodeKind, QueryResult,
    TableInfo, TableKind, TableSchema, TreeNode, Value,
};
pub use service::{BrowserService, PageRequest};
pub use store::{ConnectionRecord, ConnectionStore, JsonFileConnectionStore, MemoryConnectionStore};
