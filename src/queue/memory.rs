//! Memory

use crate::queue::{Queue, QueuedTask};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// In-memory bounded FIFO queue
pub struct MemoryQueue {
    tasks: Mutex<VecDeque<QueuedTask>>,
    capacity: usize,
    available: Notify,
}

impl MemoryQueue {
    /// Create a new in-memory queue with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            capacity,
            available: Notify::new(),
        }
    }

    async fn push(&self, task: QueuedTask, bounded: bool) -> crate::Result<()> {
        let mut tasks = self.tasks.lock().await;
        if bounded && tasks.len() >= self.capacity {
            return Err(crate::GatewayError::QueueFull(self.capacity));
        }
        debug!("Task {} enqueued (queued: {})", task.ctx.id(), tasks.len() + 1);
        tasks.push_back(task);
        drop(tasks);
        self.available.notify_one();
        Ok(())
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::with_capacity(10000)
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn enqueue(&self, task: QueuedTask) -> crate::Result<()> {
        self.push(task, true).await
    }

    async fn enqueue_overflow(&self, task: QueuedTask) -> crate::Result<()> {
        self.push(task, false).await
    }

    async fn dequeue(&self) -> crate::Result<QueuedTask> {
        let mut tasks = self.tasks.lock().await;
        match tasks.pop_front() {
            Some(task) => {
                drop(tasks);
                debug!("Task {} dequeued", task.ctx.id());
                Ok(task)
            }
            None => Err(crate::GatewayError::QueueEmpty),
        }
    }

    async fn wait_for_task(&self) {
        self.available.notified().await;
    }

    async fn size(&self) -> usize {
        self.tasks.lock().await.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn clear(&self) -> crate::Result<usize> {
        let mut tasks = self.tasks.lock().await;
        let dropped = tasks.len();
        tasks.clear();
        drop(tasks);
        debug!("Queue cleared ({} tasks dropped)", dropped);
        Ok(dropped)
    }
}
