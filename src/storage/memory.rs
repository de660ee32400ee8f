//! In-memory driver

use crate::mount::{base_name, clean_path, is_sub_path, join_path, parent_dir};
use crate::storage::{Backend, Capabilities, FileStream, ListArgs, Object, StorageInfo};
use crate::GatewayError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Driver name used in the registry
pub const DRIVER_NAME: &str = "memory";

/// Behaviour switches for a memory storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryOptions {
    /// Refuse uploads and directory creation
    pub no_upload: bool,

    /// Offer native move inside the storage
    pub native_move: bool,

    /// Offer native copy inside the storage
    pub native_copy: bool,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            no_upload: false,
            native_move: true,
            native_copy: true,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Dir { modified: DateTime<Utc> },
    File { data: Bytes, modified: DateTime<Utc> },
}

impl Node {
    fn to_object(&self, path: &str) -> Object {
        match self {
            Node::Dir { modified } => Object::dir(path, *modified),
            Node::File { data, modified } => Object::file(path, data.len() as u64, *modified),
        }
    }
}

/// Storage kept entirely in process memory
pub struct MemoryStorage {
    info: StorageInfo,
    capabilities: Capabilities,
    options: MemoryOptions,
    nodes: Arc<RwLock<BTreeMap<String, Node>>>,
}

impl MemoryStorage {
    /// Create an empty storage mounted at `mount_path`
    pub fn new(mount_path: &str) -> Self {
        Self::with_options(mount_path, MemoryOptions::default())
    }

    /// Create an empty storage with explicit options
    pub fn with_options(mount_path: &str, options: MemoryOptions) -> Self {
        Self::from_info(StorageInfo::new(mount_path, DRIVER_NAME), options)
    }

    /// Create an empty storage with a given identity
    pub fn from_info(info: StorageInfo, options: MemoryOptions) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node::Dir {
                modified: Utc::now(),
            },
        );
        Self {
            info,
            capabilities: Self::declared_capabilities(options.no_upload),
            options,
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    /// Capabilities declared by this driver
    pub fn declared_capabilities(no_upload: bool) -> Capabilities {
        Capabilities {
            name: "Memory".to_string(),
            local_sort: true,
            no_upload,
            ..Default::default()
        }
    }

    /// Write a file, creating parent directories; bypasses upload checks
    pub async fn write_file(&self, path: &str, data: impl Into<Bytes>) -> crate::Result<()> {
        let path = clean_path(path);
        let mut nodes = self.nodes.write().await;
        Self::ensure_dirs(&mut nodes, &parent_dir(&path))?;
        if let Some(Node::Dir { .. }) = nodes.get(&path) {
            return Err(GatewayError::ObjectAlreadyExists(path));
        }
        nodes.insert(
            path,
            Node::File {
                data: data.into(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    /// Whether an object exists at `path`
    pub async fn exists(&self, path: &str) -> bool {
        self.nodes.read().await.contains_key(&clean_path(path))
    }

    /// Number of objects, the root included
    pub async fn object_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    fn ensure_dirs(nodes: &mut BTreeMap<String, Node>, path: &str) -> crate::Result<()> {
        let mut current = String::new();
        for segment in clean_path(path).split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            match nodes.get(&current) {
                Some(Node::Dir { .. }) => {}
                Some(Node::File { .. }) => return Err(GatewayError::NotADirectory(current)),
                None => {
                    nodes.insert(
                        current.clone(),
                        Node::Dir {
                            modified: Utc::now(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    fn has_children(nodes: &BTreeMap<String, Node>, path: &str) -> bool {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .any(|(k, _)| k != path)
    }

    /// Keys of `src` and everything under it
    fn subtree(nodes: &BTreeMap<String, Node>, src: &str) -> Vec<String> {
        nodes
            .keys()
            .filter(|k| is_sub_path(src, k))
            .cloned()
            .collect()
    }

    /// Resolve the target of a native move or copy and check its preconditions
    fn transfer_target(
        nodes: &BTreeMap<String, Node>,
        src: &str,
        dst_dir: &str,
    ) -> crate::Result<String> {
        if src == "/" || is_sub_path(src, dst_dir) {
            return Err(GatewayError::NotSupported);
        }
        if !nodes.contains_key(src) {
            return Err(GatewayError::ObjectNotFound(src.to_string()));
        }
        match nodes.get(dst_dir) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(GatewayError::NotADirectory(dst_dir.to_string())),
            None => return Err(GatewayError::ObjectNotFound(dst_dir.to_string())),
        }
        let target = join_path(dst_dir, &base_name(src));
        if nodes.contains_key(&target) {
            return Err(GatewayError::ObjectAlreadyExists(target));
        }
        Ok(target)
    }
}

#[async_trait]
impl Backend for MemoryStorage {
    fn storage(&self) -> &StorageInfo {
        &self.info
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn get(&self, path: &str) -> crate::Result<Object> {
        let path = clean_path(path);
        let nodes = self.nodes.read().await;
        nodes
            .get(&path)
            .map(|node| node.to_object(&path))
            .ok_or(GatewayError::ObjectNotFound(path))
    }

    async fn list(&self, path: &str, _args: &ListArgs) -> crate::Result<Vec<Object>> {
        let path = clean_path(path);
        let nodes = self.nodes.read().await;
        match nodes.get(&path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(GatewayError::NotADirectory(path)),
            None => return Err(GatewayError::ObjectNotFound(path)),
        }
        Ok(nodes
            .iter()
            .filter(|(k, _)| k.as_str() != "/" && parent_dir(k) == path)
            .map(|(k, node)| node.to_object(k))
            .collect())
    }

    async fn make_dir(&self, path: &str) -> crate::Result<()> {
        if self.options.no_upload {
            return Err(GatewayError::UploadNotSupported);
        }
        let mut nodes = self.nodes.write().await;
        Self::ensure_dirs(&mut nodes, path)
    }

    async fn remove(&self, path: &str) -> crate::Result<()> {
        let path = clean_path(path);
        if path == "/" {
            return Err(GatewayError::NotSupported);
        }
        let mut nodes = self.nodes.write().await;
        match nodes.get(&path) {
            None => return Err(GatewayError::ObjectNotFound(path)),
            Some(Node::Dir { .. }) if Self::has_children(&nodes, &path) => {
                return Err(GatewayError::DirectoryNotEmpty(path));
            }
            Some(_) => {}
        }
        nodes.remove(&path);
        debug!("Removed {} from memory storage {}", path, self.info.mount_path);
        Ok(())
    }

    async fn read(&self, path: &str) -> crate::Result<FileStream> {
        let path = clean_path(path);
        let nodes = self.nodes.read().await;
        match nodes.get(&path) {
            Some(Node::File { data, modified }) => Ok(FileStream {
                name: base_name(&path),
                modified: *modified,
                data: data.clone(),
            }),
            Some(Node::Dir { .. }) => Err(GatewayError::NotSupported),
            None => Err(GatewayError::ObjectNotFound(path)),
        }
    }

    async fn put(&self, dst_dir: &str, file: FileStream) -> crate::Result<()> {
        if self.options.no_upload {
            return Err(GatewayError::UploadNotSupported);
        }
        let dst_dir = clean_path(dst_dir);
        let target = join_path(&dst_dir, &file.name);
        let mut nodes = self.nodes.write().await;
        match nodes.get(&dst_dir) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File { .. }) => return Err(GatewayError::NotADirectory(dst_dir)),
            None => return Err(GatewayError::ObjectNotFound(dst_dir)),
        }
        if let Some(Node::Dir { .. }) = nodes.get(&target) {
            return Err(GatewayError::ObjectAlreadyExists(target));
        }
        nodes.insert(
            target,
            Node::File {
                data: file.data,
                modified: file.modified,
            },
        );
        Ok(())
    }

    async fn native_move(&self, src_path: &str, dst_dir: &str) -> crate::Result<()> {
        if !self.options.native_move {
            return Err(GatewayError::NotImplemented);
        }
        let src = clean_path(src_path);
        let dst_dir = clean_path(dst_dir);
        let mut nodes = self.nodes.write().await;
        let target = Self::transfer_target(&nodes, &src, &dst_dir)?;
        for key in Self::subtree(&nodes, &src) {
            if let Some(node) = nodes.remove(&key) {
                let moved = format!("{}{}", target, &key[src.len()..]);
                nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    async fn native_copy(&self, src_path: &str, dst_dir: &str) -> crate::Result<()> {
        if !self.options.native_copy {
            return Err(GatewayError::NotImplemented);
        }
        let src = clean_path(src_path);
        let dst_dir = clean_path(dst_dir);
        let mut nodes = self.nodes.write().await;
        let target = Self::transfer_target(&nodes, &src, &dst_dir)?;
        for key in Self::subtree(&nodes, &src) {
            if let Some(node) = nodes.get(&key).cloned() {
                let copied = format!("{}{}", target, &key[src.len()..]);
                nodes.insert(copied, node);
            }
        }
        Ok(())
    }
}
