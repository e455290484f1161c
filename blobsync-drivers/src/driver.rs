//! Storage driver abstraction.

use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use blobsync_types::{
    ClientId, DeltaContext, ItemStat, Lock, LockClientType, LockType, MultiPutItem, PaginatedList,
    RemoteItem,
};
use std::path::Path;
use tokio::fs;

/// Primitive file operations against one backend.
///
/// Paths are relative to the driver root and use `/` as separator. `list`
/// returns entries relative to the listed directory. Reading or stating a
/// missing path yields `None`; deleting one is not an error.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Prepares the backend (for example creates the root directory).
    async fn initialize(&self, _base_path: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn stat(&self, path: &str) -> DriverResult<Option<ItemStat>>;

    /// Lists the direct children of `path`.
    async fn list(&self, path: &str) -> DriverResult<PaginatedList<ItemStat>>;

    async fn get(&self, path: &str) -> DriverResult<Option<Vec<u8>>>;

    /// Downloads `path` into a local file. Returns false if it does not exist.
    async fn get_to_file(&self, path: &str, dest: &Path) -> DriverResult<bool> {
        match self.get(path).await? {
            Some(content) => {
                fs::write(dest, content).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes `content`, creating parent directories as needed.
    async fn put(&self, path: &str, content: &[u8]) -> DriverResult<()>;

    /// Uploads a local file.
    async fn put_file(&self, path: &str, source: &Path) -> DriverResult<()> {
        let content = fs::read(source).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DriverError::FileNotFound(source.display().to_string()),
            _ => DriverError::Io(e),
        })?;
        self.put(path, &content).await
    }

    async fn delete(&self, path: &str) -> DriverResult<()>;

    async fn mkdir(&self, path: &str) -> DriverResult<()>;

    async fn move_item(&self, from: &str, to: &str) -> DriverResult<()>;

    /// Removes everything the driver can reach.
    async fn format(&self) -> DriverResult<()>;

    /// Removes everything under `base_path`.
    async fn clear_root(&self, base_path: &str) -> DriverResult<()>;

    /// Native change listing, for backends that have one.
    async fn delta(
        &self,
        _path: &str,
        _context: Option<&DeltaContext>,
    ) -> DriverResult<PaginatedList<RemoteItem>> {
        Err(DriverError::unsupported(self.name(), "delta"))
    }

    async fn multi_put(&self, _items: &[MultiPutItem]) -> DriverResult<()> {
        Err(DriverError::unsupported(self.name(), "multi put"))
    }

    /// Built-in lock acquisition, for backends that have one.
    async fn acquire_lock(
        &self,
        _lock_type: LockType,
        _client_type: LockClientType,
        _client_id: &ClientId,
    ) -> DriverResult<Lock> {
        Err(DriverError::unsupported(self.name(), "locks"))
    }

    async fn release_lock(
        &self,
        _lock_type: LockType,
        _client_type: LockClientType,
        _client_id: &ClientId,
    ) -> DriverResult<()> {
        Err(DriverError::unsupported(self.name(), "locks"))
    }

    async fn list_locks(&self) -> DriverResult<Vec<Lock>> {
        Err(DriverError::unsupported(self.name(), "locks"))
    }

    /// Whether `updated_time` values reflect item times exactly.
    fn supports_accurate_timestamp(&self) -> bool {
        false
    }

    fn supports_locks(&self) -> bool {
        false
    }

    fn supports_multi_put(&self) -> bool {
        false
    }

    fn supports_delta(&self) -> bool {
        false
    }

    /// Extra attempts the file layer makes after a failed call.
    fn request_repeat_count(&self) -> u32 {
        0
    }
}
