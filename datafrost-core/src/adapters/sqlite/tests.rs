//! Unit tests for the SQLite adapter.
//!
//! - Storage-class conversion into canonical values
//! - Registration metadata
//! - Lifecycle errors before connect and after close

use crate::adapters::config::{Credentials, SqliteCredentials};
use crate::adapters::{AdapterFeature, DatabaseAdapter};
use crate::error::DatafrostError;
use crate::models::Value;

use super::{SqliteAdapter, registration, sqlite_value};
use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;

// =============================================================================
// Type Mapping Tests
// =============================================================================

#[tokio::test]
async fn test_sqlite_value_storage_classes() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    let row = sqlx::query("SELECT 42, 1.5, 'hello', NULL, x'DEADBEEF'")
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(row.columns().len(), 5);
    assert_eq!(sqlite_value(&row, 0), Value::Integer(42));
    assert_eq!(sqlite_value(&row, 1), Value::Float(1.5));
    assert_eq!(sqlite_value(&row, 2), Value::String("hello".to_string()));
    assert_eq!(sqlite_value(&row, 3), Value::Null);
    assert_eq!(sqlite_value(&row, 4), Value::String("3q2+7w==".to_string()));
}

#[tokio::test]
async fn test_sqlite_value_follows_storage_not_declaration() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    sqlx::query("CREATE TABLE t (n INTEGER, s TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO t VALUES ('not a number', 7)")
        .execute(&pool)
        .await
        .unwrap();

    let row = sqlx::query("SELECT n, s FROM t").fetch_one(&pool).await.unwrap();
    assert_eq!(sqlite_value(&row, 0), Value::String("not a number".to_string()));
    // TEXT affinity converts the integer on insert
    assert_eq!(sqlite_value(&row, 1), Value::String("7".to_string()));
}

// =============================================================================
// Registration Tests
// =============================================================================

#[test]
fn test_sqlite_registration() {
    let registration = registration();
    assert_eq!(registration.info.adapter_type, "sqlite");
    assert_eq!(registration.info.ui_config.fields.len(), 1);
    assert_eq!(registration.info.ui_config.fields[0].key, "path");
    assert!(registration.info.ui_config.fields[0].required);
    assert!(registration.info.ui_config.modes.is_empty());
}

#[test]
fn test_sqlite_supported_features() {
    let adapter = SqliteAdapter::new();
    assert!(adapter.supports_feature(AdapterFeature::PragmaStatements));
    assert!(adapter.supports_feature(AdapterFeature::Indexes));
    assert!(!adapter.supports_feature(AdapterFeature::CatalogTree));
    assert!(adapter.as_tree_lister().is_none());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_operations_before_connect_fail_fast() {
    let adapter = SqliteAdapter::new();
    assert!(matches!(adapter.ping().await, Err(DatafrostError::NotConnected)));
    assert!(matches!(
        adapter.list_tables().await,
        Err(DatafrostError::NotConnected)
    ));
    // Close is safe on an unconnected adapter
    assert!(adapter.close().await.is_ok());
}

#[tokio::test]
async fn test_rejected_statement_needs_no_connection() {
    let adapter = SqliteAdapter::new();
    let err = adapter.execute_query("DROP TABLE users").await.unwrap_err();
    assert!(matches!(err, DatafrostError::RejectedStatement { .. }));
}

#[tokio::test]
async fn test_closed_adapter_cannot_reconnect() {
    let adapter = SqliteAdapter::new();
    let credentials = Credentials::Sqlite(SqliteCredentials {
        path: "/tmp/datafrost-never-opened.db".into(),
    });

    adapter.connect(&credentials).await.unwrap();
    adapter.close().await.unwrap();
    adapter.close().await.unwrap();

    assert!(adapter.connect(&credentials).await.is_err());
    assert!(matches!(adapter.ping().await, Err(DatafrostError::NotConnected)));
}

#[tokio::test]
async fn test_connect_rejects_foreign_credentials() {
    let adapter = SqliteAdapter::new();
    let credentials = Credentials::Turso(crate::adapters::config::TursoCredentials {
        url: "libsql://example.turso.io".to_string(),
        token: crate::adapters::config::Secret::new("t"),
    });
    let err = adapter.connect(&credentials).await.unwrap_err();
    assert!(matches!(err, DatafrostError::InvalidCredentialShape { .. }));
}
