//! Task manager
//!
//! Owns every task record and its lifecycle. Jobs are queued in a bounded
//! FIFO and run by a worker pool; a running job may submit further jobs
//! through its [`TaskContext`] without waiting for them. Only external
//! submissions are bounded by the queue capacity.

use crate::config::Config;
use crate::queue::memory::MemoryQueue;
use crate::queue::{Queue, QueuedTask};
use crate::task::{Job, TaskContext, TaskInfo, TaskState};
use crate::worker::pool::WorkerPool;
use crate::GatewayError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct TaskEntry {
    info: Arc<RwLock<TaskInfo>>,
    cancel: CancellationToken,
    job: Arc<dyn Job>,
}

struct ManagerInner {
    tasks: RwLock<HashMap<String, TaskEntry>>,
    queue: Arc<MemoryQueue>,
    pool: Mutex<WorkerPool>,
    shutdown_timeout: Duration,
}

/// Handle to the task manager; clones share the same tasks and workers
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

impl TaskManager {
    /// Create a manager with `worker_count` workers and room for
    /// `max_queue_size` pending tasks. Workers start with [`TaskManager::start`].
    pub fn new(worker_count: usize, max_queue_size: usize) -> Self {
        Self::build(worker_count, max_queue_size, Duration::from_secs(30))
    }

    /// Create a manager sized from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::build(
            config.worker_count,
            config.max_queue_size,
            Duration::from_secs(config.shutdown_timeout_secs),
        )
    }

    fn build(worker_count: usize, max_queue_size: usize, shutdown_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tasks: RwLock::new(HashMap::new()),
                queue: Arc::new(MemoryQueue::with_capacity(max_queue_size)),
                pool: Mutex::new(WorkerPool::new(worker_count)),
                shutdown_timeout,
            }),
        }
    }

    /// Start the workers
    pub async fn start(&self) -> crate::Result<()> {
        self.inner
            .pool
            .lock()
            .await
            .start(Arc::clone(&self.inner.queue))
    }

    /// Whether the workers are running
    pub async fn is_running(&self) -> bool {
        self.inner.pool.lock().await.is_running()
    }

    /// Submit a job; fails with `QueueFull` when no pending slot is free
    pub async fn submit<J: Job + 'static>(
        &self,
        job: J,
        creator: Option<String>,
    ) -> crate::Result<String> {
        self.admit(Arc::new(job), creator, true).await
    }

    /// Submit a job on behalf of a running task
    ///
    /// Never waits and never fails on a full queue.
    pub(crate) async fn submit_child(
        &self,
        job: Arc<dyn Job>,
        creator: Option<String>,
    ) -> crate::Result<String> {
        self.admit(job, creator, false).await
    }

    async fn admit(
        &self,
        job: Arc<dyn Job>,
        creator: Option<String>,
        bounded: bool,
    ) -> crate::Result<String> {
        let record = TaskInfo::new(job.name(), job.payload(), creator.clone());
        let id = record.id.clone();
        let info = Arc::new(RwLock::new(record));
        let cancel = CancellationToken::new();

        self.inner.tasks.write().await.insert(
            id.clone(),
            TaskEntry {
                info: Arc::clone(&info),
                cancel: cancel.clone(),
                job: Arc::clone(&job),
            },
        );

        let ctx = TaskContext::new(id.clone(), 0, creator, info, cancel, self.clone());
        let queued = QueuedTask { ctx, job };
        let result = if bounded {
            self.inner.queue.enqueue(queued).await
        } else {
            self.inner.queue.enqueue_overflow(queued).await
        };

        match result {
            Ok(()) => {
                info!("Task {} submitted", id);
                Ok(id)
            }
            Err(e) => {
                self.inner.tasks.write().await.remove(&id);
                warn!("Task {} rejected: {}", id, e);
                Err(e)
            }
        }
    }

    /// Snapshot of one task
    pub async fn get(&self, id: &str) -> crate::Result<TaskInfo> {
        let info = {
            let tasks = self.inner.tasks.read().await;
            let entry = tasks
                .get(id)
                .ok_or_else(|| GatewayError::TaskNotFound(id.to_string()))?;
            Arc::clone(&entry.info)
        };
        let snapshot = info.read().await.clone();
        Ok(snapshot)
    }

    /// Snapshots of all tasks, oldest first
    pub async fn list(&self) -> Vec<TaskInfo> {
        let records: Vec<_> = {
            let tasks = self.inner.tasks.read().await;
            tasks.values().map(|e| Arc::clone(&e.info)).collect()
        };

        let mut list = Vec::with_capacity(records.len());
        for record in records {
            list.push(record.read().await.clone());
        }
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Snapshots of the tasks in `state`, oldest first
    pub async fn list_by_state(&self, state: TaskState) -> Vec<TaskInfo> {
        self.list()
            .await
            .into_iter()
            .filter(|t| t.state == state)
            .collect()
    }

    /// Request cancellation
    ///
    /// A pending task turns `Cancelled` immediately and never runs; a running
    /// task observes the signal at its next cancellation check and ends
    /// `Cancelled` only if it gives up with `GatewayError::Cancelled`.
    pub async fn cancel(&self, id: &str) -> crate::Result<()> {
        let tasks = self.inner.tasks.read().await;
        let entry = tasks
            .get(id)
            .ok_or_else(|| GatewayError::TaskNotFound(id.to_string()))?;

        let mut record = entry.info.write().await;
        if record.is_terminal() {
            return Err(GatewayError::InvalidTaskState(format!(
                "task {} already {:?}",
                id, record.state
            )));
        }

        entry.cancel.cancel();
        if record.state == TaskState::Pending {
            record.mark_cancelled();
        }
        info!("Task {} cancellation requested", id);
        Ok(())
    }

    /// Submit a failed or cancelled task again under the same id
    pub async fn retry(&self, id: &str) -> crate::Result<()> {
        let (ctx, job) = {
            let mut tasks = self.inner.tasks.write().await;
            let entry = tasks
                .get_mut(id)
                .ok_or_else(|| GatewayError::TaskNotFound(id.to_string()))?;

            let mut record = entry.info.write().await;
            record.reset_for_retry()?;
            entry.cancel = CancellationToken::new();

            let ctx = TaskContext::new(
                id.to_string(),
                record.retry_count,
                record.creator.clone(),
                Arc::clone(&entry.info),
                entry.cancel.clone(),
                self.clone(),
            );
            (ctx, Arc::clone(&entry.job))
        };

        let record = Arc::clone(ctx.record());
        if let Err(e) = self.inner.queue.enqueue(QueuedTask { ctx, job }).await {
            record.write().await.mark_failed(e.to_string());
            return Err(e);
        }

        info!("Task {} resubmitted", id);
        Ok(())
    }

    /// Forget a terminal task
    pub async fn remove(&self, id: &str) -> crate::Result<TaskInfo> {
        let mut tasks = self.inner.tasks.write().await;
        let entry = tasks
            .get(id)
            .ok_or_else(|| GatewayError::TaskNotFound(id.to_string()))?;

        let snapshot = entry.info.read().await.clone();
        if !snapshot.is_terminal() {
            return Err(GatewayError::InvalidTaskState(format!(
                "task {} is {:?}, only finished tasks can be removed",
                id, snapshot.state
            )));
        }

        tasks.remove(id);
        debug!("Task {} removed", id);
        Ok(snapshot)
    }

    /// Forget every succeeded task, returning how many were dropped
    pub async fn clear_succeeded(&self) -> usize {
        let mut tasks = self.inner.tasks.write().await;
        let mut succeeded = Vec::new();
        for (id, entry) in tasks.iter() {
            if entry.info.read().await.state == TaskState::Succeeded {
                succeeded.push(id.clone());
            }
        }
        for id in &succeeded {
            tasks.remove(id);
        }
        succeeded.len()
    }

    /// Number of tasks waiting for a worker
    pub async fn queued_count(&self) -> usize {
        self.inner.queue.size().await
    }

    /// Wait until a task turns terminal
    pub async fn wait(&self, id: &str, timeout: Duration) -> crate::Result<TaskInfo> {
        let deadline = Instant::now() + timeout;
        loop {
            let info = self.get(id).await?;
            if info.is_terminal() {
                return Ok(info);
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout(format!(
                    "task {} still {:?} after {:?}",
                    id, info.state, timeout
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until no task is pending or running
    pub async fn wait_idle(&self, timeout: Duration) -> crate::Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let active = self
                .list()
                .await
                .iter()
                .filter(|t| !t.is_terminal())
                .count();
            if active == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout(format!(
                    "{} tasks still active after {:?}",
                    active, timeout
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Cancel every unfinished task and stop the workers
    ///
    /// Running tasks observe cancellation at their next check and are given
    /// the configured shutdown timeout to return.
    pub async fn shutdown(&self) -> crate::Result<()> {
        {
            let tasks = self.inner.tasks.read().await;
            for entry in tasks.values() {
                let mut record = entry.info.write().await;
                if record.is_terminal() {
                    continue;
                }
                entry.cancel.cancel();
                if record.state == TaskState::Pending {
                    record.mark_cancelled();
                }
            }
        }

        let result = self
            .inner
            .pool
            .lock()
            .await
            .shutdown(self.inner.shutdown_timeout)
            .await;

        let dropped = self.inner.queue.clear().await?;
        info!("Task manager stopped ({} queued tasks dropped)", dropped);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskPayload;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Job for Noop {
        fn name(&self) -> String {
            "noop".to_string()
        }

        fn payload(&self) -> TaskPayload {
            TaskPayload::new("noop".to_string(), serde_json::json!({}))
        }

        async fn run(&self, _ctx: &TaskContext) -> crate::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_when_queue_full() {
        let manager = TaskManager::new(1, 1);
        manager.submit(Noop, None).await.unwrap();

        let err = manager.submit(Noop, None).await.unwrap_err();
        assert!(matches!(err, GatewayError::QueueFull(1)));
        assert_eq!(manager.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_pending_then_retry() {
        let manager = TaskManager::new(1, 4);
        let id = manager.submit(Noop, Some("admin".to_string())).await.unwrap();

        manager.cancel(&id).await.unwrap();
        assert_eq!(manager.get(&id).await.unwrap().state, TaskState::Cancelled);

        manager.retry(&id).await.unwrap();
        manager.start().await.unwrap();

        let info = manager.wait(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(info.state, TaskState::Succeeded);
        assert_eq!(info.retry_count, 1);
        assert_eq!(info.creator.as_deref(), Some("admin"));

        manager.shutdown().await.unwrap();
    }
}
