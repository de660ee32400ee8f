/// Worker pool implementation
pub mod pool;

use crate::queue::{Queue, QueuedTask};
use crate::task::executor::TaskExecutor;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

/// A worker that processes tasks from a queue
pub struct Worker {
    id: usize,
    executor: Arc<dyn TaskExecutor>,
}

impl Worker {
    /// Create a new worker with the given ID and executor
    pub fn new(id: usize, executor: Arc<dyn TaskExecutor>) -> Self {
        Self { id, executor }
    }

    /// Process tasks until a shutdown signal arrives
    ///
    /// A task already taken from the queue is always run to completion.
    pub async fn run_with_shutdown<Q: Queue + 'static>(
        &self,
        queue: Arc<Q>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Worker {} started", self.id);

        loop {
            match shutdown_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                _ => break,
            }

            match queue.dequeue().await {
                Ok(task) => self.process(task).await,
                Err(_) => {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = queue.wait_for_task() => {}
                        _ = sleep(Duration::from_millis(100)) => {}
                    }
                }
            }
        }

        info!("Worker {} stopped", self.id);
    }

    async fn process(&self, task: QueuedTask) {
        let QueuedTask { ctx, job } = task;
        info!("Worker {} processing task {}", self.id, ctx.id());

        let executor = Arc::clone(&self.executor);
        let run_ctx = ctx.clone();
        let handle =
            tokio::spawn(async move { executor.execute(job.as_ref(), &run_ctx).await });

        match handle.await {
            Ok(Ok(())) => debug!("Worker {} finished task {}", self.id, ctx.id()),
            Ok(Err(e)) => error!("Worker {} failed to execute task: {}", self.id, e),
            Err(e) => {
                error!("Worker {} lost task {}: {}", self.id, ctx.id(), e);
                ctx.record()
                    .write()
                    .await
                    .mark_failed(format!("task aborted: {}", e));
            }
        }
    }
}
