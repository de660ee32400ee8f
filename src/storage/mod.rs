//! Storage backend interface
//!
//! Every mounted storage implements [`Backend`]. The transfer engine never
//! branches on the concrete driver; it only reacts to the distinguished
//! outcomes `NotImplemented`, `NotSupported` and `UploadNotSupported`.

/// Token refresh with credential persistence
pub mod auth;
/// Local filesystem driver
pub mod local;
/// In-memory driver
pub mod memory;
/// Engine-side wrappers around backend calls
pub mod ops;
/// Driver registry and configuration schema
pub mod registry;
/// Persistence of storage configurations
pub mod store;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A file or directory reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Last path segment
    pub name: String,

    /// Backend-local path
    pub path: String,

    /// Size in bytes, zero for directories
    pub size: u64,

    /// Directory flag
    pub is_dir: bool,

    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl Object {
    /// Describe a directory
    pub fn dir(path: &str, modified: DateTime<Utc>) -> Self {
        Self {
            name: crate::mount::base_name(path),
            path: crate::mount::clean_path(path),
            size: 0,
            is_dir: true,
            modified,
        }
    }

    /// Describe a file
    pub fn file(path: &str, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            name: crate::mount::base_name(path),
            path: crate::mount::clean_path(path),
            size,
            is_dir: false,
            modified,
        }
    }
}

/// File content handed from one backend to another
#[derive(Debug, Clone)]
pub struct FileStream {
    /// Target file name
    pub name: String,

    /// Modification time to preserve where the backend allows it
    pub modified: DateTime<Utc>,

    /// Content
    pub data: Bytes,
}

impl FileStream {
    /// Content length in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Options for listing a directory
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    /// Bypass any cached listing
    pub refresh: bool,
}

/// Static capabilities a driver declares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Driver display name
    pub name: String,

    /// Listings must be sorted by the gateway
    pub local_sort: bool,

    /// Content may only be served from the gateway host
    pub only_local: bool,

    /// Content must always be proxied
    pub only_proxy: bool,

    /// Metadata must not be cached
    pub no_cache: bool,

    /// The storage does not accept uploads or directory creation
    pub no_upload: bool,

    /// Timestamps need millisecond precision
    pub need_ms: bool,

    /// Root used when the configuration gives none
    pub default_root: String,

    /// The storage reports its own health status
    pub check_status: bool,

    /// Message shown when mounting
    pub alert: String,

    /// Uploads must not overwrite existing files
    pub no_overwrite_upload: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            name: String::new(),
            local_sort: false,
            only_local: false,
            only_proxy: false,
            no_cache: false,
            no_upload: false,
            need_ms: false,
            default_root: "/".to_string(),
            check_status: false,
            alert: String::new(),
            no_overwrite_upload: false,
        }
    }
}

/// Identity of a mounted storage instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    /// Unique storage identity; equal ids mean the same underlying storage
    pub id: Uuid,

    /// Virtual path prefix the storage is mounted at
    pub mount_path: String,

    /// Driver name
    pub driver: String,
}

impl StorageInfo {
    /// Create storage info with a fresh identity
    pub fn new(mount_path: &str, driver: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            mount_path: crate::mount::clean_path(mount_path),
            driver: driver.to_string(),
        }
    }
}

/// Trait every storage driver implements
///
/// Paths are backend-local and clean (see [`crate::mount::clean_path`]).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identity and mount path
    fn storage(&self) -> &StorageInfo;

    /// Declared capabilities
    fn capabilities(&self) -> &Capabilities;

    /// Look up a single object
    async fn get(&self, path: &str) -> crate::Result<Object>;

    /// List the immediate children of a directory
    async fn list(&self, path: &str, args: &ListArgs) -> crate::Result<Vec<Object>>;

    /// Create a directory and any missing parents
    async fn make_dir(&self, path: &str) -> crate::Result<()>;

    /// Remove a file or an empty directory
    async fn remove(&self, path: &str) -> crate::Result<()>;

    /// Read a file's content
    async fn read(&self, path: &str) -> crate::Result<FileStream>;

    /// Write a file into a directory
    async fn put(&self, dst_dir: &str, file: FileStream) -> crate::Result<()>;

    /// Move an object into another directory of the same storage
    async fn native_move(&self, _src_path: &str, _dst_dir: &str) -> crate::Result<()> {
        Err(crate::GatewayError::NotImplemented)
    }

    /// Copy an object into another directory of the same storage
    async fn native_copy(&self, _src_path: &str, _dst_dir: &str) -> crate::Result<()> {
        Err(crate::GatewayError::NotImplemented)
    }
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("storage", self.storage())
            .finish_non_exhaustive()
    }
}

/// Whether two handles refer to the same underlying storage
pub fn same_storage(a: &dyn Backend, b: &dyn Backend) -> bool {
    a.storage().id == b.storage().id
}
