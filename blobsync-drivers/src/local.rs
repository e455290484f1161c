//! Local filesystem driver.
//!
//! Maps remote paths onto a directory tree. `updated_time` is the file's
//! modification time, so two clients sharing a synced folder (network
//! drive, cloud folder) see each other's changes.

use crate::driver::StorageDriver;
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use blobsync_types::{ItemStat, PaginatedList};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, info, warn};

/// A storage driver rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    root: PathBuf,
}

fn millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn not_found_as_none<T>(result: std::io::Result<T>) -> DriverResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl LocalDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a remote path under the root, refusing to escape it.
    fn resolve(&self, path: &str) -> DriverResult<PathBuf> {
        let relative = Path::new(path.trim_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(DriverError::Storage(format!("invalid path: {path}")));
        }
        Ok(self.root.join(relative))
    }

    fn to_stat(path: &str, metadata: &std::fs::Metadata) -> ItemStat {
        let modified = metadata.modified().unwrap_or_else(|e| {
            warn!(path, "no modification time: {e}");
            SystemTime::now()
        });
        ItemStat {
            path: path.to_string(),
            updated_time: millis(modified),
            is_dir: metadata.is_dir(),
        }
    }

    async fn ensure_parent(full: &Path) -> DriverResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn remove_children(dir: &Path) -> DriverResult<()> {
        let Some(mut read_dir) = not_found_as_none(fs::read_dir(dir).await)? else {
            return Ok(());
        };
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn initialize(&self, base_path: &str) -> DriverResult<()> {
        let full = self.resolve(base_path)?;
        if fs::metadata(&full).await.is_err() {
            fs::create_dir_all(&full).await?;
            info!("Created sync directory: {:?}", full);
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> DriverResult<Option<ItemStat>> {
        let full = self.resolve(path)?;
        let metadata = not_found_as_none(fs::metadata(&full).await)?;
        Ok(metadata.map(|m| Self::to_stat(path.trim_matches('/'), &m)))
    }

    async fn list(&self, path: &str) -> DriverResult<PaginatedList<ItemStat>> {
        let full = self.resolve(path)?;
        let Some(mut read_dir) = not_found_as_none(fs::read_dir(&full).await)? else {
            return Ok(PaginatedList::complete(Vec::new()));
        };

        let mut items = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            match entry.metadata().await {
                Ok(metadata) => items.push(Self::to_stat(&name, &metadata)),
                // Removed between read_dir and metadata.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(PaginatedList::complete(items))
    }

    async fn get(&self, path: &str) -> DriverResult<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match fs::read(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // Reading a directory yields no content.
            Err(_) if full.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_to_file(&self, path: &str, dest: &Path) -> DriverResult<bool> {
        let full = self.resolve(path)?;
        match fs::copy(&full, dest).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound && fs::metadata(&full).await.is_err() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, path: &str, content: &[u8]) -> DriverResult<()> {
        let full = self.resolve(path)?;
        debug!("Writing {:?} ({} bytes)", full, content.len());
        Self::ensure_parent(&full).await?;
        fs::write(&full, content).await?;
        Ok(())
    }

    async fn put_file(&self, path: &str, source: &Path) -> DriverResult<()> {
        if fs::metadata(source).await.is_err() {
            return Err(DriverError::FileNotFound(source.display().to_string()));
        }
        let full = self.resolve(path)?;
        Self::ensure_parent(&full).await?;
        fs::copy(source, &full).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> DriverResult<()> {
        let full = self.resolve(path)?;
        let Some(metadata) = not_found_as_none(fs::metadata(&full).await)? else {
            return Ok(());
        };
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&full).await
        } else {
            fs::remove_file(&full).await
        };
        match result {
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(DriverError::ReadOnly(path.to_string())),
            other => not_found_as_none(other).map(|_| ()),
        }
    }

    async fn mkdir(&self, path: &str) -> DriverResult<()> {
        fs::create_dir_all(self.resolve(path)?).await?;
        Ok(())
    }

    async fn move_item(&self, from: &str, to: &str) -> DriverResult<()> {
        let (from, to) = (self.resolve(from)?, self.resolve(to)?);
        Self::ensure_parent(&to).await?;
        fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn format(&self) -> DriverResult<()> {
        Self::remove_children(&self.root).await
    }

    async fn clear_root(&self, base_path: &str) -> DriverResult<()> {
        Self::remove_children(&self.resolve(base_path)?).await
    }
}
