use crate::queue::Queue;
use crate::task::executor::{DefaultExecutor, TaskExecutor};
use crate::worker::Worker;
use crate::GatewayError;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Workers of a started pool and the channel that stops them
struct Running {
    workers: JoinSet<usize>,
    stop: broadcast::Sender<()>,
}

/// A fixed number of workers draining one queue
pub struct WorkerPool {
    worker_count: usize,
    executor: Arc<dyn TaskExecutor>,
    running: Option<Running>,
}

impl WorkerPool {
    /// Create a pool of `worker_count` workers using the default executor
    pub fn new(worker_count: usize) -> Self {
        Self::with_executor(worker_count, Arc::new(DefaultExecutor::new()))
    }

    /// Create a pool whose workers share `executor`
    pub fn with_executor(worker_count: usize, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            worker_count,
            executor,
            running: None,
        }
    }

    /// Spawn the workers on `queue`; fails if the pool is already running
    pub fn start<Q: Queue + 'static>(&mut self, queue: Arc<Q>) -> crate::Result<()> {
        if self.running.is_some() {
            return Err(GatewayError::WorkerPoolError(
                "Worker pool already running".to_string(),
            ));
        }

        let (stop, _) = broadcast::channel(1);
        let mut workers = JoinSet::new();
        for id in 0..self.worker_count {
            let worker = Worker::new(id, Arc::clone(&self.executor));
            let queue = Arc::clone(&queue);
            let stop_rx = stop.subscribe();
            workers.spawn(async move {
                worker.run_with_shutdown(queue, stop_rx).await;
                id
            });
        }

        info!(
            "Worker pool started with {} workers (queue capacity {})",
            self.worker_count,
            queue.capacity()
        );
        self.running = Some(Running { workers, stop });
        Ok(())
    }

    /// Stop the workers
    ///
    /// Idle workers leave at once; a worker busy with a task finishes it
    /// first. Workers still busy after `grace` are aborted and an error is
    /// returned.
    pub async fn shutdown(&mut self, grace: Duration) -> crate::Result<()> {
        let Some(mut running) = self.running.take() else {
            debug!("Worker pool not running, nothing to stop");
            return Ok(());
        };

        let _ = running.stop.send(());
        info!(
            "Stopping {} workers (grace period {:?})",
            running.workers.len(),
            grace
        );

        let joined = timeout(grace, async {
            while let Some(joined) = running.workers.join_next().await {
                match joined {
                    Ok(id) => debug!("Worker {} joined", id),
                    Err(e) => warn!("Worker ended abnormally: {}", e),
                }
            }
        })
        .await;

        if joined.is_err() {
            warn!(
                "{} workers still busy after {:?}, aborting them",
                running.workers.len(),
                grace
            );
            running.workers.abort_all();
            return Err(GatewayError::WorkerPoolError(format!(
                "Workers did not stop within {:?}",
                grace
            )));
        }

        info!("Worker pool stopped");
        Ok(())
    }

    /// Number of workers the pool spawns
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Whether the workers are running
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}
