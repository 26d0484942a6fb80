//! Cache of live adapters keyed by logical connection ID.
//!
//! At most one connected adapter exists per ID. A single async mutex guards
//! lookup, construction, `connect` and every mutation, so two concurrent
//! requests for the same uncached ID cannot both connect: the second waits
//! and observes the first one's entry. The same lock serializes connection
//! establishment across all IDs; while one backend handshake is in flight,
//! every other cache operation waits for it.

use super::{AdapterRegistry, DatabaseAdapter, connect_with_map};
use crate::Result;
use crate::adapters::config::CredentialMap;
use crate::models::ConnectionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Logical connection ID → connected adapter
pub struct AdapterCache {
    registry: Arc<AdapterRegistry>,
    entries: Mutex<HashMap<ConnectionId, Arc<dyn DatabaseAdapter>>>,
}

impl std::fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCache")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl AdapterCache {
    /// Creates an empty cache backed by `registry`.
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The registry used to construct adapters on a miss.
    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Returns the adapter for `id`, connecting a new one on a miss.
    ///
    /// On a hit the `adapter_type` and `credentials` arguments are ignored:
    /// edited credentials only take effect after [`invalidate`].
    /// A failed connect leaves no entry behind.
    ///
    /// [`invalidate`]: AdapterCache::invalidate
    pub async fn get(
        &self,
        id: ConnectionId,
        adapter_type: &str,
        credentials: &CredentialMap,
    ) -> Result<Arc<dyn DatabaseAdapter>> {
        let mut entries = self.entries.lock().await;

        if let Some(adapter) = entries.get(&id) {
            return Ok(Arc::clone(adapter));
        }

        let adapter = self.registry.get_adapter(adapter_type)?;
        if let Err(e) = connect_with_map(adapter.as_ref(), credentials).await {
            // Nothing is cached; release whatever the failed connect opened
            if let Err(close_error) = adapter.close().await {
                tracing::debug!(
                    "Ignoring close failure after failed connect for connection {}: {}",
                    id,
                    close_error
                );
            }
            return Err(e);
        }

        tracing::info!("Connected '{}' adapter for connection {}", adapter_type, id);
        entries.insert(id, Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Closes and removes the entry for `id`, if any.
    ///
    /// Must be called whenever a connection's stored type or credentials
    /// change or the connection is deleted.
    pub async fn invalidate(&self, id: ConnectionId) {
        let mut entries = self.entries.lock().await;
        if let Some(adapter) = entries.remove(&id) {
            if let Err(e) = adapter.close().await {
                tracing::warn!("Failed to close adapter for connection {}: {}", id, e);
            }
            tracing::info!("Invalidated cached adapter for connection {}", id);
        }
    }

    /// Closes and removes every entry.
    pub async fn close(&self) {
        let mut entries = self.entries.lock().await;
        for (id, adapter) in entries.drain() {
            if let Err(e) = adapter.close().await {
                tracing::warn!("Failed to close adapter for connection {}: {}", id, e);
            }
        }
        tracing::debug!("Adapter cache closed");
    }

    /// True when an adapter is cached for `id`.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.entries.lock().await.contains_key(&id)
    }

    /// Number of cached adapters.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
