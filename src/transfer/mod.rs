//! Move and copy orchestration between storages
//!
//! [`TransferService::move_object`] is the entry point. It resolves both
//! virtual paths and submits a [`MoveTask`]; the task tries the native move
//! when both ends are the same storage and otherwise falls back to copying,
//! verifying and deleting file by file, fanning directories out into child
//! tasks.

/// Single-file copy and destination verification
pub mod copy;
/// Move task state machine
pub mod move_task;

pub use copy::CopyTask;
pub use move_task::{MoveRecord, MoveTask};

use crate::manager::TaskManager;
use crate::mount::{clean_path, is_sub_path, MountTable};
use crate::task::Job;
use crate::{GatewayError, ResultExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Settings of the transfer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// How many times a copied file is looked up before giving up
    pub verify_attempts: u32,

    /// Delay between two lookups
    pub verify_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            verify_attempts: 3,
            verify_interval: Duration::from_secs(1),
        }
    }
}

/// Front door for move requests on the virtual tree
#[derive(Clone)]
pub struct TransferService {
    mounts: Arc<MountTable>,
    manager: TaskManager,
    config: TransferConfig,
}

impl TransferService {
    /// Create a service over a mount table and a task manager
    pub fn new(mounts: Arc<MountTable>, manager: TaskManager, config: TransferConfig) -> Self {
        Self {
            mounts,
            manager,
            config,
        }
    }

    /// Mount table the service resolves paths against
    pub fn mounts(&self) -> &Arc<MountTable> {
        &self.mounts
    }

    /// Task manager the service submits to
    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// Move the object at virtual path `src_path` into the virtual
    /// directory `dst_dir_path`, returning the id of the submitted task
    pub async fn move_object(
        &self,
        creator: Option<String>,
        src_path: &str,
        dst_dir_path: &str,
    ) -> crate::Result<String> {
        let src_path = clean_path(src_path);
        let dst_dir_path = clean_path(dst_dir_path);

        let (src_storage, src_actual) = self
            .mounts
            .resolve(&src_path)
            .await
            .context("failed get src storage")?;
        let (dst_storage, dst_actual) = self
            .mounts
            .resolve(&dst_dir_path)
            .await
            .context("failed get dst storage")?;

        if src_actual == "/" {
            return Err(GatewayError::NotSupported
                .context(format!("cannot move storage root [{}]", src_path)));
        }
        if is_sub_path(&src_path, &dst_dir_path) {
            return Err(GatewayError::NotSupported
                .context(format!("cannot move [{}] into itself", src_path)));
        }

        let task = MoveTask::new(
            src_storage,
            src_actual,
            dst_storage,
            dst_actual,
            Arc::clone(&self.mounts),
            self.config,
        );
        info!("Submitting {}", task.name());
        self.manager.submit(task, creator).await
    }
}
