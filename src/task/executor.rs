//! Executor

use crate::task::{TaskContext, TaskPayload, TaskState};
use async_trait::async_trait;
use tracing::{error, info};

/// A unit of work the manager can run
#[async_trait]
pub trait Job: Send + Sync {
    /// Human-readable name recorded on the task
    fn name(&self) -> String;

    /// Serializable view of the job's parameters
    fn payload(&self) -> TaskPayload;

    /// Perform the work
    ///
    /// Returning `Ok` records the task as succeeded, even when cancellation
    /// was requested meanwhile. A job that gives up on cancellation returns
    /// `GatewayError::Cancelled` and is recorded as cancelled.
    async fn run(&self, ctx: &TaskContext) -> crate::Result<()>;
}

/// Trait for executing jobs and recording their outcome
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute a job within its context and return the result
    async fn execute(&self, job: &dyn Job, ctx: &TaskContext) -> crate::Result<()>;
}

/// Default executor: runs the job once and records the outcome
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExecutor;

impl DefaultExecutor {
    /// Create a new default executor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TaskExecutor for DefaultExecutor {
    async fn execute(&self, job: &dyn Job, ctx: &TaskContext) -> crate::Result<()> {
        {
            let mut record = ctx.record().write().await;
            if record.retry_count != ctx.attempt() {
                info!("Skipping stale submission of task {}", ctx.id());
                return Ok(());
            }
            if ctx.is_cancelled() {
                record.mark_cancelled();
            }
            if record.state != TaskState::Pending {
                info!("Skipping task {} in state {:?}", ctx.id(), record.state);
                return Ok(());
            }
            record.mark_running();
        }

        let result = job.run(ctx).await;

        let mut record = ctx.record().write().await;
        match result {
            Ok(()) => {
                record.mark_succeeded();
                info!("Task {} completed successfully", ctx.id());
                Ok(())
            }
            Err(e) if matches!(e.root(), crate::GatewayError::Cancelled) => {
                record.mark_cancelled();
                info!("Task {} stopped after cancellation", ctx.id());
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                error!("Task {} failed: {}", ctx.id(), error_msg);
                record.mark_failed(error_msg.clone());
                Err(crate::GatewayError::ExecutionFailed(error_msg))
            }
        }
    }
}
