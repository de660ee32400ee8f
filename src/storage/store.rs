//! Store

use crate::storage::registry::StorageConfig;
use crate::GatewayError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Trait for persisting storage configurations
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Save a configuration
    async fn save(&self, config: &StorageConfig) -> crate::Result<()>;

    /// Load a configuration by storage ID
    async fn load(&self, id: Uuid) -> crate::Result<StorageConfig>;

    /// Delete a configuration
    async fn delete(&self, id: Uuid) -> crate::Result<()>;

    /// List all configurations
    async fn list(&self) -> crate::Result<Vec<StorageConfig>>;

    /// Update an existing configuration
    async fn update(&self, config: &StorageConfig) -> crate::Result<()>;
}

/// In-memory configuration store
pub struct MemoryConfigStore {
    configs: Arc<RwLock<HashMap<Uuid, StorageConfig>>>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            configs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: Uuid) -> GatewayError {
    GatewayError::StorageNotFound(id.to_string())
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn save(&self, config: &StorageConfig) -> crate::Result<()> {
        let mut configs = self.configs.write().await;
        configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> crate::Result<StorageConfig> {
        let configs = self.configs.read().await;
        configs.get(&id).cloned().ok_or_else(|| not_found(id))
    }

    async fn delete(&self, id: Uuid) -> crate::Result<()> {
        let mut configs = self.configs.write().await;
        configs.remove(&id).ok_or_else(|| not_found(id))?;
        Ok(())
    }

    async fn list(&self) -> crate::Result<Vec<StorageConfig>> {
        let configs = self.configs.read().await;
        let mut all: Vec<StorageConfig> = configs.values().cloned().collect();
        all.sort_by(|a, b| a.mount_path.cmp(&b.mount_path));
        Ok(all)
    }

    async fn update(&self, config: &StorageConfig) -> crate::Result<()> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.id) {
            configs.insert(config.id, config.clone());
            Ok(())
        } else {
            Err(not_found(config.id))
        }
    }
}
