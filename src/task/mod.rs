/// Task execution context handed to running jobs
pub mod context;
/// Job trait and executor implementations
pub mod executor;

pub use context::TaskContext;
pub use executor::{DefaultExecutor, Job, TaskExecutor};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a task tracked by the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Unique task identifier
    pub id: String,

    /// Human-readable task name
    pub name: String,

    /// Principal that created the task
    pub creator: Option<String>,

    /// Task payload containing type and data
    pub payload: TaskPayload,

    /// Lifecycle state of the task
    pub state: TaskState,

    /// Free-text phase of the running task
    pub status: String,

    /// Progress percentage in `[0, 100]`
    pub progress: f64,

    /// Number of times the task was retried
    pub retry_count: u32,

    /// Task creation timestamp
    pub created_at: DateTime<Utc>,

    /// Task execution start time
    pub started_at: Option<DateTime<Utc>>,

    /// Task end time, set once when the task turns terminal
    pub ended_at: Option<DateTime<Utc>>,

    /// Error message if task failed
    pub error: Option<String>,
}

/// Task payload describing the work to be done
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Type of task
    pub task_type: String,

    /// Task data as JSON
    pub data: serde_json::Value,
}

/// State of a task in its lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Task is waiting for a worker
    Pending,

    /// Task is currently being processed
    Running,

    /// Task completed successfully
    Succeeded,

    /// Task ended with an error
    Failed,

    /// Task was cancelled before or while running
    Cancelled,
}

impl TaskState {
    /// Whether no further transition can happen in this run
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl TaskInfo {
    /// Create a new pending task record
    pub fn new(name: String, payload: TaskPayload, creator: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            creator,
            payload,
            state: TaskState::Pending,
            status: String::new(),
            progress: 0.0,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error: None,
        }
    }

    /// Whether the task reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Mark task as running
    pub fn mark_running(&mut self) {
        if self.state != TaskState::Pending {
            return;
        }
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
    }

    /// Set the phase string
    pub fn set_status(&mut self, status: impl Into<String>) {
        if !self.is_terminal() {
            self.status = status.into();
        }
    }

    /// Raise progress; lower values are ignored
    pub fn set_progress(&mut self, progress: f64) {
        if self.is_terminal() || progress.is_nan() {
            return;
        }
        let progress = progress.clamp(0.0, 100.0);
        if progress > self.progress {
            self.progress = progress;
        }
    }

    /// Mark task as succeeded
    pub fn mark_succeeded(&mut self) {
        self.finish(TaskState::Succeeded, None);
    }

    /// Mark task as failed
    pub fn mark_failed(&mut self, error: String) {
        self.finish(TaskState::Failed, Some(error));
    }

    /// Mark task as cancelled
    pub fn mark_cancelled(&mut self) {
        self.finish(TaskState::Cancelled, None);
    }

    fn finish(&mut self, state: TaskState, error: Option<String>) {
        if self.is_terminal() {
            return;
        }
        self.state = state;
        self.error = error;
        self.ended_at = Some(Utc::now());
    }

    /// Put a failed or cancelled task back into the pending state
    pub fn reset_for_retry(&mut self) -> crate::Result<()> {
        if !matches!(self.state, TaskState::Failed | TaskState::Cancelled) {
            return Err(crate::GatewayError::InvalidTaskState(format!(
                "task {} is {:?}, only failed or cancelled tasks can be retried",
                self.id, self.state
            )));
        }
        self.retry_count += 1;
        self.state = TaskState::Pending;
        self.status = String::new();
        self.progress = 0.0;
        self.started_at = None;
        self.ended_at = None;
        self.error = None;
        Ok(())
    }
}

impl TaskPayload {
    /// Create a new task payload
    pub fn new(task_type: String, data: serde_json::Value) -> Self {
        Self { task_type, data }
    }
}
