//! Mount table
//!
//! Maps virtual paths onto `(storage, backend-local path)` pairs. The table is
//! shared by every running task and only read by the transfer engine.

/// Virtual path helpers
pub mod path;

pub use path::{base_name, clean_path, is_sub_path, join_path, parent_dir};

use crate::storage::registry::{DriverRegistry, StorageConfig};
use crate::storage::store::ConfigStore;
use crate::storage::Backend;
use crate::GatewayError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Mounted storages keyed by mount path
pub struct MountTable {
    storages: RwLock<BTreeMap<String, Arc<dyn Backend>>>,
}

impl MountTable {
    /// Create an empty mount table
    pub fn new() -> Self {
        Self {
            storages: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a storage at the mount path it declares
    pub async fn mount(&self, storage: Arc<dyn Backend>) -> crate::Result<()> {
        let mount_path = clean_path(&storage.storage().mount_path);
        let mut storages = self.storages.write().await;
        if storages.contains_key(&mount_path) {
            return Err(GatewayError::StorageAlreadyMounted(mount_path));
        }
        info!(
            "Mounted {} storage at {}",
            storage.storage().driver,
            mount_path
        );
        storages.insert(mount_path, storage);
        Ok(())
    }

    /// Build a storage from its configuration, persist the configuration and
    /// mount the storage
    pub async fn mount_config(
        &self,
        registry: &DriverRegistry,
        store: &dyn ConfigStore,
        config: StorageConfig,
    ) -> crate::Result<Arc<dyn Backend>> {
        let mount_path = clean_path(&config.mount_path);
        if self.storages.read().await.contains_key(&mount_path) {
            return Err(GatewayError::StorageAlreadyMounted(mount_path));
        }

        let storage = registry.create(&config)?;
        store.save(&config).await?;
        if let Err(e) = self.mount(Arc::clone(&storage)).await {
            let _ = store.delete(config.id).await;
            return Err(e);
        }
        Ok(storage)
    }

    /// Unmount the storage at `mount_path`
    pub async fn unmount(&self, mount_path: &str) -> crate::Result<Arc<dyn Backend>> {
        let mount_path = clean_path(mount_path);
        let mut storages = self.storages.write().await;
        let storage = storages
            .remove(&mount_path)
            .ok_or_else(|| GatewayError::StorageNotFound(mount_path.clone()))?;
        info!("Unmounted storage at {}", mount_path);
        Ok(storage)
    }

    /// Storage mounted exactly at `mount_path`
    pub async fn get_by_mount_path(&self, mount_path: &str) -> crate::Result<Arc<dyn Backend>> {
        let mount_path = clean_path(mount_path);
        let storages = self.storages.read().await;
        storages
            .get(&mount_path)
            .cloned()
            .ok_or(GatewayError::StorageNotFound(mount_path))
    }

    /// Resolve a virtual path to its storage and backend-local path
    ///
    /// The longest mount path that is a whole-segment prefix of `path` wins.
    pub async fn resolve(&self, path: &str) -> crate::Result<(Arc<dyn Backend>, String)> {
        let path = clean_path(path);
        let storages = self.storages.read().await;
        let (mount_path, storage) = storages
            .iter()
            .filter(|(mount_path, _)| is_sub_path(mount_path, &path))
            .max_by_key(|(mount_path, _)| mount_path.len())
            .ok_or_else(|| GatewayError::StorageNotFound(path.clone()))?;

        let actual = if mount_path == "/" {
            path.clone()
        } else {
            clean_path(&path[mount_path.len()..])
        };
        Ok((storage.clone(), actual))
    }

    /// All mount paths, sorted
    pub async fn mount_paths(&self) -> Vec<String> {
        self.storages.read().await.keys().cloned().collect()
    }

    /// Number of mounted storages
    pub async fn len(&self) -> usize {
        self.storages.read().await.len()
    }

    /// Whether nothing is mounted
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}
