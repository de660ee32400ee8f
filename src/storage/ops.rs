//! Engine-side wrappers around backend calls
//!
//! These apply the declared capabilities before a driver is reached and
//! normalize paths, so drivers can stay thin.

use crate::mount::{base_name, clean_path, join_path};
use crate::storage::{same_storage, Backend, ListArgs, Object};
use crate::GatewayError;
use tracing::debug;

/// Look up an object
pub async fn get(storage: &dyn Backend, path: &str) -> crate::Result<Object> {
    storage.get(&clean_path(path)).await
}

/// List a directory, sorting by name when the driver asks the gateway to
pub async fn list(storage: &dyn Backend, path: &str, args: &ListArgs) -> crate::Result<Vec<Object>> {
    let mut objs = storage.list(&clean_path(path), args).await?;
    if storage.capabilities().local_sort {
        objs.sort_by(|a, b| a.name.cmp(&b.name));
    }
    Ok(objs)
}

/// Create a directory; an existing directory at `path` counts as success
pub async fn make_dir(storage: &dyn Backend, path: &str) -> crate::Result<()> {
    let path = clean_path(path);
    match storage.get(&path).await {
        Ok(obj) if obj.is_dir => return Ok(()),
        Ok(_) => return Err(GatewayError::NotADirectory(path)),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }
    if storage.capabilities().no_upload {
        return Err(GatewayError::UploadNotSupported);
    }
    match storage.make_dir(&path).await {
        Err(e) if e.is_already_exists() => {
            // a sibling task may have created it between the lookup and the call
            match storage.get(&path).await {
                Ok(obj) if obj.is_dir => Ok(()),
                _ => Err(e),
            }
        }
        other => other,
    }
}

/// Remove an object; the storage root is never removed
pub async fn remove(storage: &dyn Backend, path: &str) -> crate::Result<()> {
    let path = clean_path(path);
    if path == "/" {
        return Err(GatewayError::NotSupported);
    }
    storage.remove(&path).await
}

/// Move within one storage using the driver's native operation
pub async fn move_native(storage: &dyn Backend, src_path: &str, dst_dir: &str) -> crate::Result<()> {
    storage
        .native_move(&clean_path(src_path), &clean_path(dst_dir))
        .await
}

/// Transfer a file from `src` into the directory `dst_dir` of `dst`
///
/// Uses the native copy when both handles are the same storage and the
/// driver offers it; otherwise reads the content and writes it through `put`.
pub async fn copy_in(
    src: &dyn Backend,
    src_path: &str,
    dst: &dyn Backend,
    dst_dir: &str,
) -> crate::Result<()> {
    let src_path = clean_path(src_path);
    let dst_dir = clean_path(dst_dir);
    if dst.capabilities().no_upload {
        return Err(GatewayError::UploadNotSupported);
    }

    if same_storage(src, dst) {
        match src.native_copy(&src_path, &dst_dir).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_unsupported() => {
                debug!(
                    "Native copy unavailable on {}, streaming {} instead",
                    src.storage().mount_path,
                    src_path
                );
            }
            Err(e) => return Err(e),
        }
    }

    let mut file = src.read(&src_path).await?;
    file.name = base_name(&src_path);
    debug!(
        "Streaming {} bytes from [{}]({}) to [{}]({})",
        file.size(),
        src.storage().mount_path,
        src_path,
        dst.storage().mount_path,
        join_path(&dst_dir, &file.name)
    );
    dst.put(&dst_dir, file).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryOptions, MemoryStorage};

    #[tokio::test]
    async fn test_copy_in_across_storages() {
        let src = MemoryStorage::new("/a");
        let dst = MemoryStorage::new("/b");
        src.write_file("/f.txt", "data").await.unwrap();
        dst.make_dir("/in").await.unwrap();

        copy_in(&src, "/f.txt", &dst, "/in").await.unwrap();
        assert_eq!(dst.get("/in/f.txt").await.unwrap().size, 4);
        assert!(src.exists("/f.txt").await);
    }

    #[tokio::test]
    async fn test_copy_in_same_storage_falls_back_to_streaming() {
        let storage = MemoryStorage::with_options(
            "/a",
            MemoryOptions {
                native_copy: false,
                ..Default::default()
            },
        );
        storage.write_file("/f.txt", "data").await.unwrap();
        storage.make_dir("/in").await.unwrap();

        copy_in(&storage, "/f.txt", &storage, "/in").await.unwrap();
        assert!(storage.exists("/in/f.txt").await);
    }

    #[tokio::test]
    async fn test_make_dir_checks_capabilities() {
        let ro = MemoryStorage::with_options(
            "/ro",
            MemoryOptions {
                no_upload: true,
                ..Default::default()
            },
        );
        let err = make_dir(&ro, "/new").await.unwrap_err();
        assert!(err.is_upload_not_supported());

        // existing directories are fine even without upload capability
        make_dir(&ro, "/").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_refuses_root() {
        let storage = MemoryStorage::new("/a");
        assert!(remove(&storage, "/").await.is_err());
    }
}
