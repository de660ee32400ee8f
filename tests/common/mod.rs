#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage_gateway_rs::storage::memory::{MemoryOptions, MemoryStorage};
use storage_gateway_rs::storage::{Backend, Capabilities, FileStream, ListArgs, Object, StorageInfo};
use storage_gateway_rs::{GatewayError, MountTable, TaskManager, TransferConfig, TransferService};
use tokio::sync::Notify;

/// Calls seen by every recording storage sharing the log, in order
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn count_op(&self, op: &str) -> usize {
        let prefix = format!("{} ", op);
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    /// Index of the first occurrence of `call`
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    /// Index of the last occurrence of `call`
    pub fn last_position(&self, call: &str) -> Option<usize> {
        self.calls().iter().rposition(|c| c == call)
    }
}

/// Memory storage that logs every backend call as `"<op> [<mount>]<path>"`
/// and can be told to misbehave
pub struct RecordingStorage {
    inner: MemoryStorage,
    log: CallLog,
    hidden: Mutex<HashSet<String>>,
    failing_removes: Mutex<HashSet<String>>,
    lose_make_dir_race: Mutex<bool>,
    lagging: Mutex<HashMap<String, usize>>,
    list_gate: Mutex<Option<ListGate>>,
}

/// Holds `list` of one path until released
#[derive(Clone)]
struct ListGate {
    path: String,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl RecordingStorage {
    pub fn new(mount_path: &str, options: MemoryOptions, log: CallLog) -> Self {
        Self {
            inner: MemoryStorage::with_options(mount_path, options),
            log,
            hidden: Mutex::new(HashSet::new()),
            failing_removes: Mutex::new(HashSet::new()),
            lose_make_dir_race: Mutex::new(false),
            lagging: Mutex::new(HashMap::new()),
            list_gate: Mutex::new(None),
        }
    }

    pub fn memory(&self) -> &MemoryStorage {
        &self.inner
    }

    /// `get` reports `path` as missing even when it exists
    pub fn hide(&self, path: &str) {
        self.hidden.lock().unwrap().insert(path.to_string());
    }

    /// `remove` of `path` fails
    pub fn fail_remove(&self, path: &str) {
        self.failing_removes.lock().unwrap().insert(path.to_string());
    }

    /// `make_dir` creates the directory, then reports it already existed
    pub fn lose_make_dir_race(&self) {
        *self.lose_make_dir_race.lock().unwrap() = true;
    }

    /// The first `misses` lookups of `path` report it missing
    pub fn lag(&self, path: &str, misses: usize) {
        self.lagging.lock().unwrap().insert(path.to_string(), misses);
    }

    /// `list` of `path` signals the first notify, then waits on the second
    pub fn pause_list(&self, path: &str) -> (Arc<Notify>, Arc<Notify>) {
        let gate = ListGate {
            path: path.to_string(),
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        };
        let handles = (Arc::clone(&gate.entered), Arc::clone(&gate.release));
        *self.list_gate.lock().unwrap() = Some(gate);
        handles
    }

    fn lags(&self, path: &str) -> bool {
        let mut lagging = self.lagging.lock().unwrap();
        match lagging.get_mut(path) {
            Some(misses) if *misses > 0 => {
                *misses -= 1;
                true
            }
            _ => false,
        }
    }

    fn record(&self, op: &str, path: &str) {
        self.log
            .push(format!("{} [{}]{}", op, self.inner.storage().mount_path, path));
    }
}

#[async_trait]
impl Backend for RecordingStorage {
    fn storage(&self) -> &StorageInfo {
        self.inner.storage()
    }

    fn capabilities(&self) -> &Capabilities {
        self.inner.capabilities()
    }

    async fn get(&self, path: &str) -> storage_gateway_rs::Result<Object> {
        self.record("get", path);
        if self.hidden.lock().unwrap().contains(path) || self.lags(path) {
            return Err(GatewayError::ObjectNotFound(path.to_string()));
        }
        self.inner.get(path).await
    }

    async fn list(&self, path: &str, args: &ListArgs) -> storage_gateway_rs::Result<Vec<Object>> {
        self.record("list", path);
        let gate = self
            .list_gate
            .lock()
            .unwrap()
            .clone()
            .filter(|g| g.path == path);
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.inner.list(path, args).await
    }

    async fn make_dir(&self, path: &str) -> storage_gateway_rs::Result<()> {
        self.record("make_dir", path);
        self.inner.make_dir(path).await?;
        if *self.lose_make_dir_race.lock().unwrap() {
            return Err(GatewayError::ObjectAlreadyExists(path.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> storage_gateway_rs::Result<()> {
        self.record("remove", path);
        if self.failing_removes.lock().unwrap().contains(path) {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            )));
        }
        self.inner.remove(path).await
    }

    async fn read(&self, path: &str) -> storage_gateway_rs::Result<FileStream> {
        self.record("read", path);
        self.inner.read(path).await
    }

    async fn put(&self, dst_dir: &str, file: FileStream) -> storage_gateway_rs::Result<()> {
        self.log.push(format!(
            "put [{}]{}",
            self.inner.storage().mount_path,
            storage_gateway_rs::mount::join_path(dst_dir, &file.name)
        ));
        self.inner.put(dst_dir, file).await
    }

    async fn native_move(&self, src_path: &str, dst_dir: &str) -> storage_gateway_rs::Result<()> {
        self.record("native_move", src_path);
        self.inner.native_move(src_path, dst_dir).await
    }

    async fn native_copy(&self, src_path: &str, dst_dir: &str) -> storage_gateway_rs::Result<()> {
        self.record("native_copy", src_path);
        self.inner.native_copy(src_path, dst_dir).await
    }
}

/// Transfer settings with a short verification interval
pub fn fast_transfer() -> TransferConfig {
    TransferConfig {
        verify_attempts: 3,
        verify_interval: Duration::from_millis(5),
    }
}

/// A gateway over the given storages with a running manager
pub async fn gateway(
    storages: Vec<Arc<dyn Backend>>,
    worker_count: usize,
    max_queue_size: usize,
) -> TransferService {
    gateway_with(storages, worker_count, max_queue_size, fast_transfer()).await
}

/// Like [`gateway`] with explicit transfer settings
pub async fn gateway_with(
    storages: Vec<Arc<dyn Backend>>,
    worker_count: usize,
    max_queue_size: usize,
    transfer: TransferConfig,
) -> TransferService {
    let mounts = Arc::new(MountTable::new());
    for storage in storages {
        mounts.mount(storage).await.unwrap();
    }
    let manager = TaskManager::new(worker_count, max_queue_size);
    manager.start().await.unwrap();
    TransferService::new(mounts, manager, transfer)
}

pub const WAIT: Duration = Duration::from_secs(10);
