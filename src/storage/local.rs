//! Local filesystem driver

use crate::mount::{base_name, clean_path, is_sub_path, join_path};
use crate::storage::{Backend, Capabilities, FileStream, ListArgs, Object, StorageInfo};
use crate::GatewayError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Driver name used in the registry
pub const DRIVER_NAME: &str = "local";

/// Storage backed by a directory on the gateway host
pub struct LocalStorage {
    info: StorageInfo,
    capabilities: Capabilities,
    root: PathBuf,
}

impl LocalStorage {
    /// Create a storage rooted at `root`, mounted at `mount_path`
    pub fn new<P: AsRef<Path>>(mount_path: &str, root: P) -> Self {
        Self::from_info(StorageInfo::new(mount_path, DRIVER_NAME), root)
    }

    /// Create a storage with a given identity
    pub fn from_info<P: AsRef<Path>>(info: StorageInfo, root: P) -> Self {
        Self {
            info,
            capabilities: Self::declared_capabilities(),
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Capabilities declared by this driver
    pub fn declared_capabilities() -> Capabilities {
        Capabilities {
            name: "Local".to_string(),
            local_sort: true,
            only_local: true,
            no_cache: true,
            ..Default::default()
        }
    }

    /// Map a backend-local path onto the host filesystem
    fn host_path(&self, path: &str) -> PathBuf {
        let cleaned = clean_path(path);
        let relative = cleaned.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    async fn metadata_object(&self, path: &str) -> crate::Result<Object> {
        let path = clean_path(path);
        let meta = match fs::metadata(self.host_path(&path)).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GatewayError::ObjectNotFound(path))
            }
            Err(e) => return Err(e.into()),
        };
        let modified: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
        if meta.is_dir() {
            Ok(Object::dir(&path, modified))
        } else {
            Ok(Object::file(&path, meta.len(), modified))
        }
    }
}

fn map_not_found(e: std::io::Error, path: &str) -> GatewayError {
    if e.kind() == ErrorKind::NotFound {
        GatewayError::ObjectNotFound(path.to_string())
    } else {
        e.into()
    }
}

#[async_trait]
impl Backend for LocalStorage {
    fn storage(&self) -> &StorageInfo {
        &self.info
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn get(&self, path: &str) -> crate::Result<Object> {
        self.metadata_object(path).await
    }

    async fn list(&self, path: &str, _args: &ListArgs) -> crate::Result<Vec<Object>> {
        let path = clean_path(path);
        let mut entries = fs::read_dir(self.host_path(&path))
            .await
            .map_err(|e| map_not_found(e, &path))?;
        let mut objs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.metadata_object(&join_path(&path, &name)).await {
                Ok(obj) => objs.push(obj),
                // dangling link or entry removed while listing
                Err(e) if e.is_not_found() => {
                    debug!("Skipping vanished entry {} in [{}]({})", name, self.info.mount_path, path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(objs)
    }

    async fn make_dir(&self, path: &str) -> crate::Result<()> {
        let host = self.host_path(path);
        match fs::create_dir_all(&host).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(GatewayError::NotADirectory(clean_path(path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, path: &str) -> crate::Result<()> {
        let path = clean_path(path);
        if path == "/" {
            return Err(GatewayError::NotSupported);
        }
        let host = self.host_path(&path);
        let meta = fs::metadata(&host)
            .await
            .map_err(|e| map_not_found(e, &path))?;
        if meta.is_dir() {
            let mut entries = fs::read_dir(&host).await?;
            if entries.next_entry().await?.is_some() {
                return Err(GatewayError::DirectoryNotEmpty(path));
            }
            fs::remove_dir(&host).await?;
        } else {
            fs::remove_file(&host).await?;
        }
        Ok(())
    }

    async fn read(&self, path: &str) -> crate::Result<FileStream> {
        let object = self.metadata_object(path).await?;
        if object.is_dir {
            return Err(GatewayError::NotSupported);
        }
        let data = fs::read(self.host_path(&object.path)).await?;
        Ok(FileStream {
            name: object.name,
            modified: object.modified,
            data: Bytes::from(data),
        })
    }

    async fn put(&self, dst_dir: &str, file: FileStream) -> crate::Result<()> {
        let dst_dir = clean_path(dst_dir);
        let dir = self.metadata_object(&dst_dir).await?;
        if !dir.is_dir {
            return Err(GatewayError::NotADirectory(dst_dir));
        }
        let target = self.host_path(&join_path(&dst_dir, &file.name));
        fs::write(&target, &file.data).await?;
        Ok(())
    }

    async fn native_move(&self, src_path: &str, dst_dir: &str) -> crate::Result<()> {
        let src = clean_path(src_path);
        let dst_dir = clean_path(dst_dir);
        if src == "/" || is_sub_path(&src, &dst_dir) {
            return Err(GatewayError::NotSupported);
        }
        self.metadata_object(&src).await?;
        let target = join_path(&dst_dir, &base_name(&src));
        if fs::try_exists(self.host_path(&target)).await? {
            return Err(GatewayError::ObjectAlreadyExists(target));
        }
        fs::rename(self.host_path(&src), self.host_path(&target)).await?;
        Ok(())
    }

    async fn native_copy(&self, src_path: &str, dst_dir: &str) -> crate::Result<()> {
        let object = self.metadata_object(src_path).await?;
        if object.is_dir {
            return Err(GatewayError::NotSupported);
        }
        let target = join_path(dst_dir, &object.name);
        fs::copy(self.host_path(&object.path), self.host_path(&target)).await?;
        Ok(())
    }
}
