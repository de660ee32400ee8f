//! Pending-task queue

/// Memory
pub mod memory;

use crate::task::{Job, TaskContext};
use async_trait::async_trait;
use std::sync::Arc;

/// A job waiting for a worker, together with the context it will run in
pub struct QueuedTask {
    /// Context of the submission
    pub ctx: TaskContext,

    /// Work to perform
    pub job: Arc<dyn Job>,
}

/// Trait for queue implementations
#[async_trait]
pub trait Queue: Send + Sync {
    /// Add a task, failing with `QueueFull` at capacity
    async fn enqueue(&self, task: QueuedTask) -> crate::Result<()>;

    /// Add a task even past capacity
    ///
    /// Used for follow-up work of a running task, which must never wait on
    /// the workers that would drain the queue.
    async fn enqueue_overflow(&self, task: QueuedTask) -> crate::Result<()>;

    /// Remove and return the oldest task
    async fn dequeue(&self) -> crate::Result<QueuedTask>;

    /// Resolve once a task may be available
    async fn wait_for_task(&self);

    /// Get the current size of the queue
    async fn size(&self) -> usize;

    /// Check if the queue is empty
    async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Maximum number of queued tasks
    fn capacity(&self) -> usize;

    /// Drop all queued tasks, returning how many were dropped
    async fn clear(&self) -> crate::Result<usize>;
}
