//! Storage Gateway RS - a unified storage gateway with a cross-storage transfer engine
//!
//! This library presents many heterogeneous storage backends as a single virtual
//! tree through mount points, and moves files between them with an asynchronous
//! task manager that never deletes a source before the destination is confirmed.

/// Configuration management for the gateway
pub mod config;
/// Tracing setup and response error logging
pub mod logging;
/// Task manager owning the lifecycle of every submitted task
pub mod manager;
/// Mount table and virtual path resolution
pub mod mount;
/// Pending-task queue implementations
pub mod queue;
/// Storage backend interface, drivers and driver registry
pub mod storage;
/// Task definitions and execution logic
pub mod task;
/// Move and copy orchestration between storages
pub mod transfer;
/// Worker pool and worker management
pub mod worker;

pub use config::Config;
pub use manager::TaskManager;
pub use mount::MountTable;
pub use storage::{Backend, Capabilities, Object};
pub use task::{TaskContext, TaskInfo, TaskPayload, TaskState};
pub use transfer::{MoveTask, TransferConfig, TransferService};

use thiserror::Error;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Error types for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Queue is empty, no tasks available
    #[error("Queue is empty")]
    QueueEmpty,

    /// Queue reached its configured capacity
    #[error("Queue is full (capacity {0})")]
    QueueFull(usize),

    /// Task with the specified ID was not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Operation not allowed in the task's current state
    #[error("Invalid task state: {0}")]
    InvalidTaskState(String),

    /// The task observed its cancellation signal
    #[error("Task cancelled")]
    Cancelled,

    /// Task execution failed with an error
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// Waiting for a condition exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Worker pool encountered an error
    #[error("Worker pool error: {0}")]
    WorkerPoolError(String),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend does not implement this operation
    #[error("not implemented")]
    NotImplemented,

    /// The backend implements the operation but refuses it for these arguments
    #[error("not supported")]
    NotSupported,

    /// The backend does not accept uploads
    #[error("upload not supported")]
    UploadNotSupported,

    /// No object at the given backend path
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// An object already occupies the given backend path
    #[error("object already exists: {0}")]
    ObjectAlreadyExists(String),

    /// Path expected to be a directory is a file
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Directory still has children
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// No storage is mounted for a virtual path or mount path
    #[error("storage not found: {0}")]
    StorageNotFound(String),

    /// Mount path already taken
    #[error("storage already mounted at {0}")]
    StorageAlreadyMounted(String),

    /// No driver registered under the given name
    #[error("driver not found: {0}")]
    DriverNotFound(String),

    /// Credentials came back empty
    #[error("empty token")]
    EmptyToken,

    /// Credentials were rejected as expired
    #[error("token expired")]
    TokenExpired,

    /// Destination storage cannot accept writes
    #[error("destination storage [{mount_path}] does not support {action}: {source}")]
    DestinationNoUpload {
        /// Mount path of the destination storage
        mount_path: String,
        /// What was attempted, e.g. "file uploads"
        action: &'static str,
        /// Underlying capability error
        source: Box<GatewayError>,
    },

    /// Copy reported success but the destination never showed the file
    #[error("file not found in destination [{path}] after copy ({attempts} attempts): {source}")]
    VerificationFailed {
        /// Expected destination path
        path: String,
        /// Number of lookups performed
        attempts: u32,
        /// Error returned by the last lookup
        source: Box<GatewayError>,
    },

    /// An error wrapped with the operation and path that produced it
    #[error("{message}: {source}")]
    Context {
        /// Operation and path description
        message: String,
        /// Wrapped error
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Wrap this error with a message describing the failed operation
    pub fn context(self, message: impl Into<String>) -> Self {
        GatewayError::Context {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error of a wrapping chain
    pub fn root(&self) -> &GatewayError {
        match self {
            GatewayError::Context { source, .. }
            | GatewayError::DestinationNoUpload { source, .. }
            | GatewayError::VerificationFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// `NotImplemented` or `NotSupported`: a signal to fall back, not a failure
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self.root(),
            GatewayError::NotImplemented | GatewayError::NotSupported
        )
    }

    /// The destination lacks upload capability
    pub fn is_upload_not_supported(&self) -> bool {
        matches!(self.root(), GatewayError::UploadNotSupported)
    }

    /// The object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), GatewayError::ObjectNotFound(_))
    }

    /// The object already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), GatewayError::ObjectAlreadyExists(_))
    }

    /// Credentials are empty or expired and a refresh may help
    pub fn is_token_invalid(&self) -> bool {
        matches!(
            self.root(),
            GatewayError::EmptyToken | GatewayError::TokenExpired
        )
    }
}

/// Attach operation context to a `Result`
pub trait ResultExt<T> {
    /// Wrap the error with a fixed message
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Wrap the error with a lazily built message
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}
