//! Adapter cache and browsing service behaviour against a counting adapter.
//!
//! - One connect per logical connection ID, even under concurrent lookups
//! - Invalidation closes the cached adapter and forces a reconnect
//! - Failed connects leave nothing cached

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use datafrost_core::adapters::{AdapterRegistration, BackendKind, Credentials};
use datafrost_core::models::UiConfig;
use datafrost_core::{
    AdapterCache, AdapterFeature, AdapterInfo, AdapterRegistry, BrowserService, ConnectionRecord,
    ConnectionStore, CredentialMap, DatabaseAdapter, DatafrostError, Filter,
    MemoryConnectionStore, PageRequest, QueryResult, Result, TableInfo, TableKind, TableSchema,
    Value,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
}

struct CountingAdapter {
    counters: Arc<Counters>,
    fail_connect: bool,
}

#[async_trait]
impl DatabaseAdapter for CountingAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn connect(&self, _credentials: &Credentials) -> Result<()> {
        // Widen the window for concurrent callers
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(DatafrostError::connection_failed(
                "refused",
                std::io::Error::other("connection refused"),
            ));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(vec![TableInfo::new("events", TableKind::Table)])
    }

    async fn get_table_data(
        &self,
        table: &str,
        limit: u32,
        offset: u32,
        filters: &[Filter],
    ) -> Result<QueryResult> {
        let rows = vec![vec![
            Value::String(table.to_string()),
            Value::Integer(i64::try_from(filters.len()).unwrap()),
        ]];
        Ok(QueryResult::from_rows(vec!["table".to_string(), "filters".to_string()], rows)
            .with_pagination(100, limit, offset))
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        Ok(QueryResult::from_rows(
            vec!["sql".to_string()],
            vec![vec![Value::String(sql.to_string())]],
        ))
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        Ok(TableSchema::new(table))
    }

    fn supports_feature(&self, _feature: AdapterFeature) -> bool {
        false
    }
}

fn info(adapter_type: &str) -> AdapterInfo {
    AdapterInfo {
        adapter_type: adapter_type.to_string(),
        name: adapter_type.to_uppercase(),
        description: "counting adapter".to_string(),
        ui_config: UiConfig::default(),
    }
}

fn registry(counters: &Arc<Counters>) -> Arc<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    let ok = Arc::clone(counters);
    registry.register(AdapterRegistration::new(info("counting"), move || {
        CountingAdapter {
            counters: Arc::clone(&ok),
            fail_connect: false,
        }
    }));
    let failing = Arc::clone(counters);
    registry.register(AdapterRegistration::new(info("failing"), move || {
        CountingAdapter {
            counters: Arc::clone(&failing),
            fail_connect: true,
        }
    }));
    Arc::new(registry)
}

fn credentials() -> CredentialMap {
    json!({"path": "/tmp/unused.db"}).as_object().cloned().unwrap()
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn test_cache_returns_same_adapter() {
    let counters = Arc::new(Counters::default());
    let cache = AdapterCache::new(registry(&counters));

    let first = cache.get(1, "counting", &credentials()).await.unwrap();
    let second = cache.get(1, "counting", &credentials()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len().await, 1);
}

#[tokio::test]
async fn test_cache_hit_ignores_arguments() {
    let counters = Arc::new(Counters::default());
    let cache = AdapterCache::new(registry(&counters));

    let first = cache.get(1, "counting", &credentials()).await.unwrap();
    // Stale arguments on a hit are not re-validated
    let second = cache.get(1, "no-such-type", &CredentialMap::new()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_cache_concurrent_lookups_connect_once() {
    let counters = Arc::new(Counters::default());
    let cache = Arc::new(AdapterCache::new(registry(&counters)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            cache.get(42, "counting", &credentials()).await.unwrap()
        }));
    }

    let mut adapters = Vec::new();
    for handle in handles {
        adapters.push(handle.await.unwrap());
    }

    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
    assert!(adapters.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[tokio::test]
async fn test_cache_invalidate_forces_reconnect() {
    let counters = Arc::new(Counters::default());
    let cache = AdapterCache::new(registry(&counters));

    let first = cache.get(1, "counting", &credentials()).await.unwrap();
    cache.invalidate(1).await;
    assert!(!cache.contains(1).await);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

    let second = cache.get(1, "counting", &credentials()).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);

    // Invalidating an unknown ID is a no-op
    cache.invalidate(99).await;
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_failed_connect_is_not_cached() {
    let counters = Arc::new(Counters::default());
    let cache = AdapterCache::new(registry(&counters));

    let err = cache.get(5, "failing", &credentials()).await.err().unwrap();
    assert!(matches!(err, DatafrostError::ConnectionFailed { .. }));
    assert!(cache.is_empty().await);
    // The half-open adapter is released
    assert_eq!(counters.closes.load(Ordering::SeqCst), 1);

    assert!(cache.get(5, "failing", &credentials()).await.is_err());
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_rejects_bad_input_without_caching() {
    let counters = Arc::new(Counters::default());
    let cache = AdapterCache::new(registry(&counters));

    let err = cache.get(1, "oracle", &credentials()).await.err().unwrap();
    assert!(matches!(err, DatafrostError::UnknownAdapterType { .. }));

    let err = cache.get(1, "counting", &CredentialMap::new()).await.err().unwrap();
    assert!(matches!(err, DatafrostError::MissingCredentialField { .. }));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_cache_close_releases_everything() {
    let counters = Arc::new(Counters::default());
    let cache = AdapterCache::new(registry(&counters));

    for id in 1..=3 {
        cache.get(id, "counting", &credentials()).await.unwrap();
    }
    cache.close().await;

    assert!(cache.is_empty().await);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Service
// =============================================================================

fn service(counters: &Arc<Counters>) -> (Arc<MemoryConnectionStore>, BrowserService) {
    let store = Arc::new(MemoryConnectionStore::new());
    store.upsert(ConnectionRecord::new(1, "events", "counting", credentials()));
    let shared: Arc<dyn ConnectionStore> = store.clone();
    let service = BrowserService::new(shared, registry(counters));
    (store, service)
}

#[tokio::test]
async fn test_service_unknown_connection() {
    let counters = Arc::new(Counters::default());
    let (_store, service) = service(&counters);

    let err = service.list_tables(404).await.unwrap_err();
    assert!(matches!(err, DatafrostError::ConnectionNotFound { id: 404 }));
}

#[tokio::test]
async fn test_service_paging_defaults() {
    let counters = Arc::new(Counters::default());
    let (_store, service) = service(&counters);

    let result = service
        .get_table_data(1, "events", &PageRequest::new(None, Some(3)))
        .await
        .unwrap();
    assert_eq!(result.limit, 25);
    assert_eq!(result.page, 3);
    assert_eq!(result.total, 100);

    let filtered = PageRequest::default()
        .with_filters_json(r#"[{"column": "kind", "operator": "eq", "value": "click"}]"#)
        .unwrap();
    let result = service.get_table_data(1, "events", &filtered).await.unwrap();
    assert_eq!(result.rows[0][1], Value::Integer(1));
}

#[tokio::test]
async fn test_service_blank_query_never_connects() {
    let counters = Arc::new(Counters::default());
    let (_store, service) = service(&counters);

    let err = service.execute_query(1, "   ").await.unwrap_err();
    assert!(matches!(err, DatafrostError::Configuration { .. }));
    assert_eq!(counters.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_service_update_invalidates_cache() {
    let counters = Arc::new(Counters::default());
    let (store, service) = service(&counters);

    service.list_tables(1).await.unwrap();
    assert!(service.cache().contains(1).await);

    store.upsert(ConnectionRecord::new(1, "events", "failing", credentials()));
    // Still served from the cache until told about the edit
    service.list_tables(1).await.unwrap();

    service.connection_updated(1).await;
    assert!(service.list_tables(1).await.is_err());

    store.remove(1);
    service.connection_deleted(1).await;
    assert!(service.cache().is_empty().await);
}

#[tokio::test]
async fn test_service_test_connection_bypasses_cache() {
    let counters = Arc::new(Counters::default());
    let (_store, service) = service(&counters);

    service.test_existing(1).await.unwrap();
    service
        .test_connection("counting", &credentials())
        .await
        .unwrap();
    assert!(service.cache().is_empty().await);
    assert_eq!(counters.closes.load(Ordering::SeqCst), 2);

    let err = service.test_connection(" ", &credentials()).await.unwrap_err();
    assert!(matches!(err, DatafrostError::Configuration { .. }));
}

#[tokio::test]
async fn test_service_lists_adapters_sorted() {
    let counters = Arc::new(Counters::default());
    let (_store, service) = service(&counters);

    let types: Vec<_> = service
        .list_adapters()
        .into_iter()
        .map(|a| a.adapter_type)
        .collect();
    assert_eq!(types, vec!["counting", "failing"]);
}
