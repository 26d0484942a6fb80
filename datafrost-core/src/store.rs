//! Connection records and the stores that look them up.
//!
//! The browsing service only ever reads records by ID; creating and
//! editing them belongs to whichever application embeds the core, which
//! must call [`BrowserService::connection_updated`] or
//! [`BrowserService::connection_deleted`] afterwards.
//!
//! [`BrowserService::connection_updated`]: crate::service::BrowserService::connection_updated
//! [`BrowserService::connection_deleted`]: crate::service::BrowserService::connection_deleted

use crate::Result;
use crate::adapters::config::CredentialMap;
use crate::error::DatafrostError;
use crate::models::ConnectionId;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A saved connection: ID, display name, adapter type and credentials.
#[derive(Clone, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub name: String,
    #[serde(rename = "type")]
    pub adapter_type: String,
    #[serde(default)]
    pub credentials: CredentialMap,
}

impl std::fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("adapter_type", &self.adapter_type)
            .field("credential_keys", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConnectionRecord {
    pub fn new(
        id: ConnectionId,
        name: impl Into<String>,
        adapter_type: impl Into<String>,
        credentials: CredentialMap,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            adapter_type: adapter_type.into(),
            credentials,
        }
    }
}

/// Read access to saved connections.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// The record for `id`, or `None` when no such connection exists.
    async fn get_by_id(&self, id: ConnectionId) -> Result<Option<ConnectionRecord>>;

    /// Every record, ordered by ID.
    async fn list(&self) -> Result<Vec<ConnectionRecord>>;
}

/// In-memory store for tests and embedding applications.
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    records: RwLock<BTreeMap<ConnectionId, ConnectionRecord>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a record, returning the previous one.
    pub fn upsert(&self, record: ConnectionRecord) -> Option<ConnectionRecord> {
        self.records.write().insert(record.id, record)
    }

    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionRecord> {
        self.records.write().remove(&id)
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn get_by_id(&self, id: ConnectionId) -> Result<Option<ConnectionRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }
}

/// Read-only store backed by a JSON array of records.
///
/// ```json
/// [{"id": 1, "name": "local", "type": "sqlite", "credentials": {"path": "app.db"}}]
/// ```
#[derive(Debug)]
pub struct JsonFileConnectionStore {
    path: PathBuf,
    records: BTreeMap<ConnectionId, ConnectionRecord>,
}

impl JsonFileConnectionStore {
    /// Loads and validates the file.
    ///
    /// # Errors
    /// `Io` when the file cannot be read, `Serialization` when it is not a
    /// JSON array of records, `Configuration` on a duplicate ID.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            DatafrostError::io(format!("Failed to read connections file {}", path.display()), e)
        })?;
        let store = Self::from_json(&path, &text)?;
        tracing::debug!(
            "Loaded {} connection(s) from {}",
            store.records.len(),
            path.display()
        );
        Ok(store)
    }

    fn from_json(path: &Path, text: &str) -> Result<Self> {
        let parsed: Vec<ConnectionRecord> = serde_json::from_str(text).map_err(|e| {
            DatafrostError::serialization(
                format!("Failed to parse connections file {}", path.display()),
                e,
            )
        })?;

        let mut records = BTreeMap::new();
        for record in parsed {
            let id = record.id;
            if records.insert(id, record).is_some() {
                return Err(DatafrostError::configuration(format!(
                    "duplicate connection id {} in {}",
                    id,
                    path.display()
                )));
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConnectionStore for JsonFileConnectionStore {
    async fn get_by_id(&self, id: ConnectionId) -> Result<Option<ConnectionRecord>> {
        Ok(self.records.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self.records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials(value: serde_json::Value) -> CredentialMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_upsert_and_remove() {
        let store = MemoryConnectionStore::new();
        assert!(store.get_by_id(1).await.unwrap().is_none());

        store.upsert(ConnectionRecord::new(2, "b", "sqlite", CredentialMap::new()));
        store.upsert(ConnectionRecord::new(1, "a", "sqlite", CredentialMap::new()));
        let ids: Vec<_> = store.list().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(store.remove(1).is_some());
        assert!(store.get_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_file_store_loads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.json");
        std::fs::write(
            &path,
            json!([
                {"id": 7, "name": "local", "type": "sqlite", "credentials": {"path": "app.db"}},
                {"id": 3, "name": "warehouse", "type": "postgres"}
            ])
            .to_string(),
        )
        .unwrap();

        let store = JsonFileConnectionStore::open(&path).await.unwrap();
        let record = store.get_by_id(7).await.unwrap().unwrap();
        assert_eq!(record.adapter_type, "sqlite");
        assert_eq!(record.credentials, credentials(json!({"path": "app.db"})));
        assert!(store.get_by_id(3).await.unwrap().unwrap().credentials.is_empty());
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[test]
    fn test_json_file_store_rejects_duplicates() {
        let text = r#"[{"id": 1, "name": "a", "type": "sqlite"}, {"id": 1, "name": "b", "type": "sqlite"}]"#;
        let err = JsonFileConnectionStore::from_json(Path::new("c.json"), text).unwrap_err();
        assert!(matches!(err, DatafrostError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_json_file_store_missing_file() {
        let err = JsonFileConnectionStore::open("/nonexistent/connections.json")
            .await
            .unwrap_err();
        assert!(matches!(err, DatafrostError::Io { .. }));
    }

    #[test]
    fn test_record_debug_hides_credential_values() {
        let record = ConnectionRecord::new(
            1,
            "prod",
            "postgres",
            credentials(json!({"url": "postgres://u:hunter2@db/app"})),
        );
        let debug = format!("{:?}", record);
        assert!(debug.contains("url"));
        assert!(!debug.contains("hunter2"));
    }
}
