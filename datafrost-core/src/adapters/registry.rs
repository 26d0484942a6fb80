//! Adapter registry: type tag → (metadata, constructor).

use super::{DatabaseAdapter, connect_with_map};
use crate::Result;
use crate::adapters::config::CredentialMap;
use crate::error::DatafrostError;
use crate::models::AdapterInfo;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor producing a fresh, unconnected adapter.
pub type AdapterFactory = Arc<dyn Fn() -> Arc<dyn DatabaseAdapter> + Send + Sync>;

/// Descriptor and constructor for one adapter type
#[derive(Clone)]
pub struct AdapterRegistration {
    pub info: AdapterInfo,
    pub factory: AdapterFactory,
}

impl AdapterRegistration {
    /// Creates a registration from a constructor closure.
    pub fn new<F, A>(info: AdapterInfo, constructor: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: DatabaseAdapter + 'static,
    {
        Self {
            info,
            factory: Arc::new(move || Arc::new(constructor()) as Arc<dyn DatabaseAdapter>),
        }
    }
}

impl std::fmt::Debug for AdapterRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistration")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Maps backend type tags to adapter constructors.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<String, AdapterRegistration>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every backend compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(super::sqlite::registration());
        #[cfg(feature = "turso")]
        registry.register(super::turso::registration());
        #[cfg(feature = "postgresql")]
        registry.register(super::postgres::registration());
        #[cfg(feature = "bigquery")]
        registry.register(super::bigquery::registration());
        #[cfg(feature = "snowflake")]
        registry.register(super::snowflake::registration());

        registry
    }

    /// Adds or replaces the registration for its type tag.
    pub fn register(&mut self, registration: AdapterRegistration) {
        tracing::debug!("Registering adapter type '{}'", registration.info.adapter_type);
        self.adapters
            .insert(registration.info.adapter_type.clone(), registration);
    }

    /// Constructs a fresh, unconnected adapter.
    ///
    /// # Errors
    /// `UnknownAdapterType` when nothing is registered under `adapter_type`.
    pub fn get_adapter(&self, adapter_type: &str) -> Result<Arc<dyn DatabaseAdapter>> {
        self.registration(adapter_type)
            .map(|registration| (registration.factory)())
    }

    /// Returns the descriptor of one adapter type.
    pub fn adapter_info(&self, adapter_type: &str) -> Result<AdapterInfo> {
        self.registration(adapter_type)
            .map(|registration| registration.info.clone())
    }

    /// Returns every registered descriptor, in no particular order.
    pub fn list_adapters(&self) -> Vec<AdapterInfo> {
        self.adapters
            .values()
            .map(|registration| registration.info.clone())
            .collect()
    }

    /// Construct → connect → ping → close.
    ///
    /// The adapter is closed on every path; the first failure is returned.
    pub async fn test_connection(
        &self,
        adapter_type: &str,
        credentials: &CredentialMap,
    ) -> Result<()> {
        let adapter = self.get_adapter(adapter_type)?;

        let outcome = match connect_with_map(adapter.as_ref(), credentials).await {
            Ok(()) => adapter.ping().await,
            Err(e) => Err(e),
        };
        let closed = adapter.close().await;

        match outcome {
            Ok(()) => {
                tracing::info!("Connection test for '{}' succeeded", adapter_type);
                closed
            }
            Err(e) => {
                if let Err(close_error) = closed {
                    tracing::warn!(
                        "Failed to close '{}' adapter after failed test: {}",
                        adapter_type,
                        close_error
                    );
                }
                Err(e)
            }
        }
    }

    fn registration(&self, adapter_type: &str) -> Result<&AdapterRegistration> {
        self.adapters
            .get(adapter_type)
            .ok_or_else(|| DatafrostError::UnknownAdapterType {
                adapter_type: adapter_type.to_string(),
            })
    }
}
