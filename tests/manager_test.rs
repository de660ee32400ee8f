use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storage_gateway_rs::task::Job;
use storage_gateway_rs::{GatewayError, TaskContext, TaskManager, TaskPayload, TaskState};
use tokio::sync::Notify;
use tokio::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn payload(kind: &str) -> TaskPayload {
    TaskPayload::new(kind.to_string(), serde_json::json!({}))
}

/// Counts its runs and succeeds
struct CountingJob {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Job for CountingJob {
    fn name(&self) -> String {
        "count".to_string()
    }

    fn payload(&self) -> TaskPayload {
        payload("count")
    }

    async fn run(&self, ctx: &TaskContext) -> storage_gateway_rs::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.set_status("counted").await;
        ctx.set_progress(100.0).await;
        Ok(())
    }
}

/// Fails on its first run, succeeds afterwards
struct FlakyJob {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Job for FlakyJob {
    fn name(&self) -> String {
        "flaky".to_string()
    }

    fn payload(&self) -> TaskPayload {
        payload("flaky")
    }

    async fn run(&self, _ctx: &TaskContext) -> storage_gateway_rs::Result<()> {
        if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(GatewayError::ObjectNotFound("/a.txt".to_string())
                .context("failed get src [/a.txt] file"));
        }
        Ok(())
    }
}

/// Runs until cancelled, announcing that it started, then gives up
struct UntilCancelled {
    started: Arc<Notify>,
}

#[async_trait]
impl Job for UntilCancelled {
    fn name(&self) -> String {
        "until cancelled".to_string()
    }

    fn payload(&self) -> TaskPayload {
        payload("wait")
    }

    async fn run(&self, ctx: &TaskContext) -> storage_gateway_rs::Result<()> {
        ctx.set_progress(10.0).await;
        self.started.notify_one();
        ctx.cancellation_token().cancelled().await;
        Err(GatewayError::Cancelled)
    }
}

/// Finishes its work even when cancelled mid-way
struct FinishesAnyway {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Job for FinishesAnyway {
    fn name(&self) -> String {
        "finishes anyway".to_string()
    }

    fn payload(&self) -> TaskPayload {
        payload("finish")
    }

    async fn run(&self, ctx: &TaskContext) -> storage_gateway_rs::Result<()> {
        self.started.notify_one();
        self.release.notified().await;
        ctx.set_progress(100.0).await;
        ctx.set_status("completed").await;
        Ok(())
    }
}

/// Submits `children` counting jobs
struct FanOutJob {
    children: usize,
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Job for FanOutJob {
    fn name(&self) -> String {
        "fan out".to_string()
    }

    fn payload(&self) -> TaskPayload {
        payload("fan_out")
    }

    async fn run(&self, ctx: &TaskContext) -> storage_gateway_rs::Result<()> {
        for _ in 0..self.children {
            ctx.submit(CountingJob {
                runs: Arc::clone(&self.runs),
            })
            .await?;
        }
        Ok(())
    }
}

struct PanickingJob;

#[async_trait]
impl Job for PanickingJob {
    fn name(&self) -> String {
        "panic".to_string()
    }

    fn payload(&self) -> TaskPayload {
        payload("panic")
    }

    async fn run(&self, _ctx: &TaskContext) -> storage_gateway_rs::Result<()> {
        panic!("boom");
    }
}

#[tokio::test]
async fn test_task_runs_once_and_records_lifecycle() {
    let manager = TaskManager::new(2, 16);
    manager.start().await.unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let id = manager
        .submit(
            CountingJob {
                runs: Arc::clone(&runs),
            },
            Some("admin".to_string()),
        )
        .await
        .unwrap();
    let info = manager.wait(&id, WAIT).await.unwrap();

    assert_eq!(info.state, TaskState::Succeeded);
    assert_eq!(info.status, "counted");
    assert_eq!(info.progress, 100.0);
    assert_eq!(info.creator.as_deref(), Some("admin"));
    assert!(info.started_at.unwrap() <= info.ended_at.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_each_submission_is_distinct() {
    let manager = TaskManager::new(2, 16);
    manager.start().await.unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    let second = manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    assert_ne!(first, second);

    manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(manager.list_by_state(TaskState::Succeeded).await.len(), 2);
}

#[tokio::test]
async fn test_failed_task_records_error_and_can_be_retried() {
    let manager = TaskManager::new(1, 16);
    manager.start().await.unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let id = manager
        .submit(FlakyJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    let info = manager.wait(&id, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Failed);
    assert_eq!(
        info.error.as_deref(),
        Some("failed get src [/a.txt] file: object not found: /a.txt")
    );
    let first_end = info.ended_at.unwrap();

    manager.retry(&id).await.unwrap();
    let info = manager.wait(&id, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Succeeded);
    assert_eq!(info.retry_count, 1);
    assert!(info.error.is_none());
    assert!(info.ended_at.unwrap() >= first_end);
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let err = manager.retry(&id).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidTaskState(_)));
}

#[tokio::test]
async fn test_cancel_running_task() {
    let manager = TaskManager::new(1, 16);
    manager.start().await.unwrap();
    let started = Arc::new(Notify::new());

    let id = manager
        .submit(
            UntilCancelled {
                started: Arc::clone(&started),
            },
            None,
        )
        .await
        .unwrap();
    started.notified().await;
    assert_eq!(manager.get(&id).await.unwrap().state, TaskState::Running);

    manager.cancel(&id).await.unwrap();
    let info = manager.wait(&id, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Cancelled);
    assert_eq!(info.progress, 10.0);
    assert!(info.ended_at.is_some());

    let err = manager.cancel(&id).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidTaskState(_)));
}

#[tokio::test]
async fn test_work_finished_after_cancel_counts_as_success() {
    let manager = TaskManager::new(1, 16);
    manager.start().await.unwrap();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let id = manager
        .submit(
            FinishesAnyway {
                started: Arc::clone(&started),
                release: Arc::clone(&release),
            },
            None,
        )
        .await
        .unwrap();
    started.notified().await;
    manager.cancel(&id).await.unwrap();
    release.notify_one();

    let info = manager.wait(&id, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Succeeded);
    assert_eq!(info.status, "completed");
    assert!(info.error.is_none());
}

#[tokio::test]
async fn test_cancelled_pending_task_never_runs() {
    let manager = TaskManager::new(1, 16);
    let runs = Arc::new(AtomicUsize::new(0));

    let id = manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    manager.cancel(&id).await.unwrap();

    manager.start().await.unwrap();
    manager.wait_idle(WAIT).await.unwrap();
    while manager.queued_count().await > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let info = manager.get(&id).await.unwrap();
    assert_eq!(info.state, TaskState::Cancelled);
    assert!(info.started_at.is_none());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_children_inherit_creator() {
    let manager = TaskManager::new(2, 16);
    manager.start().await.unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let id = manager
        .submit(
            FanOutJob {
                children: 3,
                runs: Arc::clone(&runs),
            },
            Some("carol".to_string()),
        )
        .await
        .unwrap();
    manager.wait(&id, WAIT).await.unwrap();
    manager.wait_idle(WAIT).await.unwrap();

    let tasks = manager.list().await;
    assert_eq!(tasks.len(), 4);
    for task in &tasks {
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.creator.as_deref(), Some("carol"));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_children_overflow_a_full_queue() {
    let manager = TaskManager::new(1, 1);
    manager.start().await.unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let id = manager
        .submit(
            FanOutJob {
                children: 4,
                runs: Arc::clone(&runs),
            },
            None,
        )
        .await
        .unwrap();
    let parent = manager.wait(&id, WAIT).await.unwrap();
    assert_eq!(parent.state, TaskState::Succeeded, "{:?}", parent.error);

    manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(manager.list_by_state(TaskState::Succeeded).await.len(), 5);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_full_queue_rejects_external_submissions() {
    let manager = TaskManager::new(1, 2);
    let runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        manager
            .submit(CountingJob { runs: Arc::clone(&runs) }, None)
            .await
            .unwrap();
    }
    let err = manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::QueueFull(2)));
    assert_eq!(manager.list().await.len(), 2);
    assert_eq!(manager.queued_count().await, 2);
}

#[tokio::test]
async fn test_remove_and_clear_finished_tasks() {
    let manager = TaskManager::new(1, 16);
    let runs = Arc::new(AtomicUsize::new(0));

    let pending = manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    let err = manager.remove(&pending).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidTaskState(_)));

    manager.start().await.unwrap();
    let flaky = manager
        .submit(FlakyJob { runs: Arc::new(AtomicUsize::new(0)) }, None)
        .await
        .unwrap();
    manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    manager.wait_idle(WAIT).await.unwrap();

    assert_eq!(manager.clear_succeeded().await, 2);
    let remaining = manager.list().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, flaky);

    let removed = manager.remove(&flaky).await.unwrap();
    assert_eq!(removed.state, TaskState::Failed);
    assert!(matches!(
        manager.get(&flaky).await,
        Err(GatewayError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn test_wait_times_out() {
    let manager = TaskManager::new(1, 16);
    let id = manager
        .submit(CountingJob { runs: Arc::new(AtomicUsize::new(0)) }, None)
        .await
        .unwrap();

    let err = manager
        .wait(&id, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));

    let err = manager.wait_idle(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
}

#[tokio::test]
async fn test_panicking_task_is_marked_failed() {
    let manager = TaskManager::new(1, 16);
    manager.start().await.unwrap();

    let id = manager.submit(PanickingJob, None).await.unwrap();
    let info = manager.wait(&id, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Failed);
    assert!(info.error.unwrap().starts_with("task aborted"));

    // the worker survives and keeps serving
    let runs = Arc::new(AtomicUsize::new(0));
    let id = manager
        .submit(CountingJob { runs: Arc::clone(&runs) }, None)
        .await
        .unwrap();
    assert_eq!(
        manager.wait(&id, WAIT).await.unwrap().state,
        TaskState::Succeeded
    );
}
