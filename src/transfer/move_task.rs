//! Move task

use crate::mount::{is_sub_path, join_path, parent_dir, MountTable};
use crate::storage::{ops, same_storage, Backend, ListArgs, Object};
use crate::task::{Job, TaskContext, TaskPayload};
use crate::transfer::copy::{verify_in_destination, CopyTask};
use crate::transfer::TransferConfig;
use crate::{GatewayError, ResultExt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Payload type of move tasks
pub const TASK_TYPE: &str = "move";

/// Caller-visible description of a move, stored as the task payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Source object, local to the source storage
    pub src_path: String,

    /// Destination directory, local to the destination storage
    pub dst_path: String,

    /// Mount path of the source storage
    pub src_storage_mp: String,

    /// Mount path of the destination storage
    pub dst_storage_mp: String,

    /// Source directory whose move fanned this task out; unset for moves
    /// requested directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_root: Option<String>,
}

/// Moves one object between (or within) storages
#[derive(Clone)]
pub struct MoveTask {
    record: MoveRecord,
    src_storage: Option<Arc<dyn Backend>>,
    dst_storage: Option<Arc<dyn Backend>>,
    mounts: Arc<MountTable>,
    config: TransferConfig,
}

impl MoveTask {
    /// Create a move of `src_obj_path` into `dst_dir_path` over resolved storages
    pub fn new(
        src_storage: Arc<dyn Backend>,
        src_obj_path: String,
        dst_storage: Arc<dyn Backend>,
        dst_dir_path: String,
        mounts: Arc<MountTable>,
        config: TransferConfig,
    ) -> Self {
        Self {
            record: MoveRecord {
                src_path: src_obj_path,
                dst_path: dst_dir_path,
                src_storage_mp: src_storage.storage().mount_path.clone(),
                dst_storage_mp: dst_storage.storage().mount_path.clone(),
                tree_root: None,
            },
            src_storage: Some(src_storage),
            dst_storage: Some(dst_storage),
            mounts,
            config,
        }
    }

    /// Rebuild a move from its record; storages are looked up by mount path
    /// when the task runs
    pub fn from_record(record: MoveRecord, mounts: Arc<MountTable>, config: TransferConfig) -> Self {
        Self {
            record,
            src_storage: None,
            dst_storage: None,
            mounts,
            config,
        }
    }

    /// Rebuild a move from a task payload
    pub fn from_payload(
        payload: &TaskPayload,
        mounts: Arc<MountTable>,
        config: TransferConfig,
    ) -> crate::Result<Self> {
        if payload.task_type != TASK_TYPE {
            return Err(GatewayError::InvalidTaskState(format!(
                "expected a {} payload, got {}",
                TASK_TYPE, payload.task_type
            )));
        }
        let record: MoveRecord = serde_json::from_value(payload.data.clone())?;
        Ok(Self::from_record(record, mounts, config))
    }

    /// Description of this move
    pub fn record(&self) -> &MoveRecord {
        &self.record
    }

    fn child(
        &self,
        src_storage: &Arc<dyn Backend>,
        src_obj_path: String,
        dst_storage: &Arc<dyn Backend>,
        dst_dir_path: String,
    ) -> Self {
        let mut child = Self::new(
            Arc::clone(src_storage),
            src_obj_path,
            Arc::clone(dst_storage),
            dst_dir_path,
            Arc::clone(&self.mounts),
            self.config,
        );
        child.record.tree_root = Some(
            self.record
                .tree_root
                .clone()
                .unwrap_or_else(|| self.record.src_path.clone()),
        );
        child
    }

    async fn storages(&self) -> crate::Result<(Arc<dyn Backend>, Arc<dyn Backend>)> {
        let src = match &self.src_storage {
            Some(storage) => Arc::clone(storage),
            None => self.mounts.get_by_mount_path(&self.record.src_storage_mp).await?,
        };
        let dst = match &self.dst_storage {
            Some(storage) => Arc::clone(storage),
            None => self.mounts.get_by_mount_path(&self.record.dst_storage_mp).await?,
        };
        Ok((src, dst))
    }

    async fn move_between(
        &self,
        ctx: &TaskContext,
        src: &Arc<dyn Backend>,
        dst: &Arc<dyn Backend>,
    ) -> crate::Result<()> {
        let src_path = &self.record.src_path;

        ctx.set_status("getting src object").await;
        let src_obj = ops::get(src.as_ref(), src_path)
            .await
            .with_context(|| format!("failed get src [{}] file", src_path))?;

        if src_obj.is_dir {
            self.move_dir(ctx, src, dst, &src_obj).await
        } else {
            self.move_file(ctx, src, dst).await
        }
    }

    async fn move_dir(
        &self,
        ctx: &TaskContext,
        src: &Arc<dyn Backend>,
        dst: &Arc<dyn Backend>,
        src_obj: &Object,
    ) -> crate::Result<()> {
        let src_path = &self.record.src_path;
        let dst_mount = &dst.storage().mount_path;

        ctx.set_status("src object is dir, listing objs").await;
        let objs = ops::list(src.as_ref(), src_path, &ListArgs::default())
            .await
            .with_context(|| format!("failed list src [{}] objs", src_path))?;

        let dst_obj_path = join_path(&self.record.dst_path, &src_obj.name);
        ctx.set_status("creating destination directory").await;
        if let Err(e) = ops::make_dir(dst.as_ref(), &dst_obj_path).await {
            if e.is_upload_not_supported() {
                return Err(GatewayError::DestinationNoUpload {
                    mount_path: dst_mount.clone(),
                    action: "creating directories",
                    source: Box::new(e),
                });
            }
            return Err(e.context(format!(
                "failed to create destination directory [{}] in storage [{}]",
                dst_obj_path, dst_mount
            )));
        }

        let total = objs.len();
        for (idx, obj) in objs.iter().enumerate() {
            if ctx.is_cancelled() {
                info!(
                    "Task {} cancelled after submitting {}/{} moves of [{}]",
                    ctx.id(),
                    idx,
                    total,
                    src_path
                );
                ctx.set_status(&format!(
                    "cancelled after submitting {}/{} moves",
                    idx, total
                ))
                .await;
                return Ok(());
            }

            let child_src = join_path(src_path, &obj.name);
            let child = self.child(src, child_src.clone(), dst, dst_obj_path.clone());
            let id = ctx
                .submit(child)
                .await
                .with_context(|| format!("failed to submit move of [{}]", child_src))?;
            debug!("Task {} submitted move of [{}] as {}", ctx.id(), child_src, id);
            ctx.set_progress((idx + 1) as f64 * 100.0 / total as f64).await;
        }

        ctx.set_status("cleaning up source directory").await;
        match ops::remove(src.as_ref(), src_path).await {
            Ok(()) => {
                self.remove_emptied_ancestors(src.as_ref()).await;
                ctx.set_progress(100.0).await;
                ctx.set_status("completed").await;
            }
            Err(e) => {
                debug!(
                    "Source directory [{}]({}) not removed yet: {}",
                    src.storage().mount_path,
                    src_path,
                    e
                );
                ctx.set_progress(100.0).await;
                ctx.set_status("completed (source directory cleanup pending)")
                    .await;
            }
        }
        Ok(())
    }

    async fn move_file(
        &self,
        ctx: &TaskContext,
        src: &Arc<dyn Backend>,
        dst: &Arc<dyn Backend>,
    ) -> crate::Result<()> {
        let src_path = &self.record.src_path;

        ctx.set_status("copying file to destination").await;
        let copy = CopyTask::new(Arc::clone(src), src_path, Arc::clone(dst), &self.record.dst_path);
        copy.run(ctx).await?;

        ctx.set_progress(50.0).await;
        ctx.set_status("verifying file in destination").await;
        let dst_file_path = copy.dst_file_path();
        verify_in_destination(dst.as_ref(), &dst_file_path, &self.config).await?;

        ctx.set_status("deleting source file").await;
        ops::remove(src.as_ref(), src_path).await.with_context(|| {
            format!(
                "failed to delete src [{}] file from storage [{}] after successful copy",
                src_path,
                src.storage().mount_path
            )
        })?;

        self.remove_emptied_ancestors(src.as_ref()).await;
        ctx.set_progress(100.0).await;
        ctx.set_status("completed").await;
        Ok(())
    }

    /// Remove source directories of the moved tree left empty by this task,
    /// walking up to the tree root and stopping at the first one that stays
    async fn remove_emptied_ancestors(&self, src: &dyn Backend) {
        let Some(root) = &self.record.tree_root else {
            return;
        };

        let mut dir = parent_dir(&self.record.src_path);
        while is_sub_path(root, &dir) {
            if let Err(e) = ops::remove(src, &dir).await {
                if !e.is_not_found() && !matches!(e.root(), GatewayError::DirectoryNotEmpty(_)) {
                    warn!(
                        "Failed to clean up [{}]({}): {}",
                        src.storage().mount_path,
                        dir,
                        e
                    );
                }
                return;
            }
            debug!("Removed emptied source directory [{}]({})", src.storage().mount_path, dir);
            if dir == *root {
                return;
            }
            dir = parent_dir(&dir);
        }
    }
}

#[async_trait]
impl Job for MoveTask {
    fn name(&self) -> String {
        format!(
            "move [{}]({}) to [{}]({})",
            self.record.src_storage_mp,
            self.record.src_path,
            self.record.dst_storage_mp,
            self.record.dst_path
        )
    }

    fn payload(&self) -> TaskPayload {
        TaskPayload::new(
            TASK_TYPE.to_string(),
            serde_json::to_value(&self.record).unwrap_or_default(),
        )
    }

    async fn run(&self, ctx: &TaskContext) -> crate::Result<()> {
        ctx.set_status("resolving storages").await;
        let (src, dst) = self.storages().await.context("failed get storage")?;

        // fanned-out children already know the storage declined a native move
        if self.record.tree_root.is_none() && same_storage(src.as_ref(), dst.as_ref()) {
            match ops::move_native(src.as_ref(), &self.record.src_path, &self.record.dst_path).await
            {
                Ok(()) => {
                    info!("Task {} moved natively within [{}]", ctx.id(), self.record.src_storage_mp);
                    ctx.set_progress(100.0).await;
                    ctx.set_status("completed").await;
                    return Ok(());
                }
                Err(e) if e.is_unsupported() => {
                    debug!(
                        "Native move declined by [{}] ({}), falling back to copy",
                        self.record.src_storage_mp, e
                    );
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "failed move [{}] within storage [{}]",
                        self.record.src_path, self.record.src_storage_mp
                    )))
                }
            }
        }

        self.move_between(ctx, &src, &dst).await
    }
}
