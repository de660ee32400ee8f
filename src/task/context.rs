//! Context

use crate::manager::TaskManager;
use crate::task::{Job, TaskInfo};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle a running job uses to report progress, observe cancellation and
/// submit follow-up tasks
#[derive(Clone)]
pub struct TaskContext {
    id: String,
    attempt: u32,
    creator: Option<String>,
    info: Arc<RwLock<TaskInfo>>,
    cancel: CancellationToken,
    manager: TaskManager,
}

impl TaskContext {
    pub(crate) fn new(
        id: String,
        attempt: u32,
        creator: Option<String>,
        info: Arc<RwLock<TaskInfo>>,
        cancel: CancellationToken,
        manager: TaskManager,
    ) -> Self {
        Self {
            id,
            attempt,
            creator,
            info,
            cancel,
            manager,
        }
    }

    /// Task identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Retry count of the submission this context belongs to
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Principal that created the task
    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancellation signal of this run
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Update the phase string
    pub async fn set_status(&self, status: &str) {
        debug!("Task {}: {}", self.id, status);
        self.info.write().await.set_status(status);
    }

    /// Raise progress
    pub async fn set_progress(&self, progress: f64) {
        self.info.write().await.set_progress(progress);
    }

    /// Snapshot of the task record
    pub async fn info(&self) -> TaskInfo {
        self.info.read().await.clone()
    }

    /// Submit an independent task owned by the manager
    ///
    /// The child inherits this task's creator. It is admitted even when the
    /// queue is at capacity, so a fanning-out task never waits on the queue.
    pub async fn submit<J: Job + 'static>(&self, job: J) -> crate::Result<String> {
        self.manager
            .submit_child(Arc::new(job), self.creator.clone())
            .await
    }

    pub(crate) fn record(&self) -> &Arc<RwLock<TaskInfo>> {
        &self.info
    }
}
