//! Storage gateway binary entry point

use std::sync::Arc;
use storage_gateway_rs::storage::registry::DriverRegistry;
use storage_gateway_rs::storage::store::MemoryConfigStore;
use storage_gateway_rs::{logging, Config, MountTable, TaskManager, TransferService};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    logging::init(&config.log_level)?;

    info!("Starting storage gateway");

    let registry = DriverRegistry::with_builtin();
    let store = MemoryConfigStore::new();
    let mounts = Arc::new(MountTable::new());
    for mount in &config.mounts {
        if mount.disabled {
            warn!("Skipping disabled storage at {}", mount.mount_path);
            continue;
        }
        mounts
            .mount_config(&registry, &store, mount.storage_config())
            .await?;
    }

    info!(
        "Initialized with {} workers, max queue size: {}, {} storages mounted",
        config.worker_count,
        config.max_queue_size,
        mounts.len().await
    );

    let manager = TaskManager::from_config(&config);
    manager.start().await?;
    let service = TransferService::new(mounts, manager.clone(), config.transfer());
    info!(
        "Serving mount paths {:?}",
        service.mounts().mount_paths().await
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    manager.shutdown().await?;

    Ok(())
}
