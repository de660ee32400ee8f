//! Single-file copy between two storages

use crate::mount::{base_name, join_path};
use crate::storage::{ops, Backend, Object};
use crate::task::TaskContext;
use crate::transfer::TransferConfig;
use crate::GatewayError;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;

/// Copy half of a file move
///
/// Always run inline by the move that built it and reports through that
/// move's context; never submitted to the manager on its own.
pub struct CopyTask {
    src_storage: Arc<dyn Backend>,
    dst_storage: Arc<dyn Backend>,
    src_obj_path: String,
    dst_dir_path: String,
}

impl CopyTask {
    /// Create a copy of `src_obj_path` on `src` into `dst_dir_path` on `dst`
    pub fn new(
        src_storage: Arc<dyn Backend>,
        src_obj_path: &str,
        dst_storage: Arc<dyn Backend>,
        dst_dir_path: &str,
    ) -> Self {
        Self {
            src_storage,
            dst_storage,
            src_obj_path: src_obj_path.to_string(),
            dst_dir_path: dst_dir_path.to_string(),
        }
    }

    /// Human-readable name
    pub fn name(&self) -> String {
        format!(
            "copy [{}]({}) to [{}]({})",
            self.src_storage.storage().mount_path,
            self.src_obj_path,
            self.dst_storage.storage().mount_path,
            self.dst_dir_path
        )
    }

    /// Path the file is expected at once copied
    pub fn dst_file_path(&self) -> String {
        join_path(&self.dst_dir_path, &base_name(&self.src_obj_path))
    }

    /// Transfer the file
    ///
    /// A destination without upload capability yields
    /// [`GatewayError::DestinationNoUpload`]; anything else is wrapped with the
    /// source path and destination mount.
    pub async fn run(&self, ctx: &TaskContext) -> crate::Result<()> {
        debug!("Task {}: {}", ctx.id(), self.name());
        let dst_mount = &self.dst_storage.storage().mount_path;

        ops::copy_in(
            self.src_storage.as_ref(),
            &self.src_obj_path,
            self.dst_storage.as_ref(),
            &self.dst_dir_path,
        )
        .await
        .map_err(|e| {
            if e.is_upload_not_supported() {
                GatewayError::DestinationNoUpload {
                    mount_path: dst_mount.clone(),
                    action: "file uploads",
                    source: Box::new(e),
                }
            } else {
                e.context(format!(
                    "failed to copy [{}] to destination storage [{}]",
                    self.src_obj_path, dst_mount
                ))
            }
        })
    }
}

/// Look the copied file up until it shows, for at most
/// `config.verify_attempts` lookups spaced by `config.verify_interval`
pub async fn verify_in_destination(
    dst: &dyn Backend,
    dst_file_path: &str,
    config: &TransferConfig,
) -> crate::Result<Object> {
    let attempts = config.verify_attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match ops::get(dst, dst_file_path).await {
            Ok(obj) => return Ok(obj),
            Err(e) => {
                debug!(
                    "Lookup {}/{} of [{}]({}) failed: {}",
                    attempt,
                    attempts,
                    dst.storage().mount_path,
                    dst_file_path,
                    e
                );
                last_err = Some(e);
            }
        }
        if attempt < attempts {
            sleep(config.verify_interval).await;
        }
    }

    Err(GatewayError::VerificationFailed {
        path: dst_file_path.to_string(),
        attempts,
        source: Box::new(
            last_err.unwrap_or_else(|| GatewayError::ObjectNotFound(dst_file_path.to_string())),
        ),
    })
}
