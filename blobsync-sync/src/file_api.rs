//! File access layer.
//!
//! Wraps a [`StorageDriver`]: resolves paths under a base directory, retries
//! failed calls, filters listings and estimates the remote clock. Everything
//! above this layer talks to `FileApi`, never to the driver.

use crate::config::{DeltaOptions, FileApiOptions};
use crate::delta::basic_delta;
use crate::error::{SyncError, SyncResult};
use blobsync_drivers::{DriverResult, StorageDriver};
use blobsync_types::timestamp::unix_ms;
use blobsync_types::{
    create_uuid, paths, ClientId, ItemStat, Lock, LockClientType, LockType, MultiPutItem,
    PaginatedList, RemoteItem,
};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long a measured clock offset stays valid.
const CLOCK_CHECK_INTERVAL_MS: i64 = 10 * 60 * 1000;

/// How long a failed measurement (zero offset) stays valid.
const CLOCK_RETRY_INTERVAL_MS: i64 = 60 * 1000;

const CLOCK_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CLOCK_PROBE_POLL: Duration = Duration::from_millis(200);

/// Filters applied by [`FileApi::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Keep entries with a path component starting with `.`.
    pub include_hidden: bool,
    pub include_dirs: bool,
    /// Keep only `<id>.md` entries.
    pub sync_items_only: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            include_dirs: true,
            sync_items_only: false,
        }
    }
}

#[derive(Debug, Default)]
struct RemoteClock {
    offset_ms: i64,
    /// Local time after which the offset must be measured again.
    next_check_ms: i64,
}

/// Path-resolving, retrying front end of a storage driver.
pub struct FileApi {
    driver: Arc<dyn StorageDriver>,
    options: FileApiOptions,
    clock: Mutex<RemoteClock>,
}

impl FileApi {
    pub fn new(driver: Arc<dyn StorageDriver>, options: FileApiOptions) -> Self {
        Self {
            driver,
            options,
            clock: Mutex::new(RemoteClock::default()),
        }
    }

    pub fn driver(&self) -> &Arc<dyn StorageDriver> {
        &self.driver
    }

    pub fn base_dir(&self) -> &str {
        &self.options.base_dir
    }

    /// Resolves `path` under the base directory.
    pub fn full_path(&self, path: &str) -> String {
        paths::join(&self.options.base_dir, path)
    }

    pub fn request_repeat_count(&self) -> u32 {
        self.options
            .request_repeat_count
            .unwrap_or_else(|| self.driver.request_repeat_count())
    }

    pub fn supports_locks(&self) -> bool {
        self.driver.supports_locks()
    }

    pub fn supports_multi_put(&self) -> bool {
        self.driver.supports_multi_put()
    }

    pub fn supports_accurate_timestamp(&self) -> bool {
        self.driver.supports_accurate_timestamp()
    }

    /// Runs `call`, retrying up to `request_repeat_count` extra times.
    async fn with_repeat<T, F, Fut>(&self, operation: &str, path: &str, call: F) -> SyncResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let max_attempts = self.request_repeat_count() + 1;
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && !e.is_permanent() => {
                    warn!(
                        operation,
                        path,
                        attempt,
                        "driver call failed, retrying: {e}"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn initialize(&self) -> SyncResult<()> {
        let base = self.options.base_dir.as_str();
        self.with_repeat("initialize", base, || self.driver.initialize(base))
            .await
    }

    /// Lists the direct children of `path`.
    pub async fn list(&self, path: &str, options: ListOptions) -> SyncResult<PaginatedList<ItemStat>> {
        let full = self.full_path(path);
        debug!("list {full}");
        let mut output = self.with_repeat("list", &full, || self.driver.list(&full)).await?;
        output.items.retain(|stat| {
            (options.include_hidden || !paths::is_hidden(&stat.path))
                && (options.include_dirs || !stat.is_dir)
                && (!options.sync_items_only || paths::is_item_path(&stat.path))
        });
        Ok(output)
    }

    /// Stats `path`. The returned stat carries `path` as given.
    pub async fn stat(&self, path: &str) -> SyncResult<Option<ItemStat>> {
        let full = self.full_path(path);
        debug!("stat {full}");
        let stat = self.with_repeat("stat", &full, || self.driver.stat(&full)).await?;
        Ok(stat.map(|s| ItemStat {
            path: path.to_string(),
            ..s
        }))
    }

    pub async fn get(&self, path: &str) -> SyncResult<Option<Vec<u8>>> {
        let full = self.full_path(path);
        debug!("get {full}");
        self.with_repeat("get", &full, || self.driver.get(&full)).await
    }

    /// Downloads `path` into `dest`. Returns false when it does not exist.
    pub async fn get_to_file(&self, path: &str, dest: &Path) -> SyncResult<bool> {
        let full = self.full_path(path);
        debug!("get {full} -> {}", dest.display());
        self.with_repeat("get", &full, || self.driver.get_to_file(&full, dest))
            .await
    }

    pub async fn put(&self, path: &str, content: &[u8]) -> SyncResult<()> {
        let full = self.full_path(path);
        debug!("put {full} ({} bytes)", content.len());
        self.with_repeat("put", &full, || self.driver.put(&full, content))
            .await
    }

    /// Uploads a local file. Fails with `FileNotFound` if `source` is missing.
    pub async fn put_file(&self, path: &str, source: &Path) -> SyncResult<()> {
        if tokio::fs::metadata(source).await.is_err() {
            return Err(SyncError::FileNotFound(format!(
                "File not found: {}",
                source.display()
            )));
        }
        let full = self.full_path(path);
        debug!("put {full} <- {}", source.display());
        self.with_repeat("put", &full, || self.driver.put_file(&full, source))
            .await
    }

    pub async fn multi_put(&self, items: &[MultiPutItem]) -> SyncResult<()> {
        if !self.driver.supports_multi_put() {
            return Err(SyncError::Unsupported("Multi PUT not supported".to_string()));
        }
        let items: Vec<MultiPutItem> = items
            .iter()
            .map(|item| MultiPutItem {
                path: self.full_path(&item.path),
                body: item.body.clone(),
            })
            .collect();
        debug!("multi put ({} items)", items.len());
        self.with_repeat("multiPut", "", || self.driver.multi_put(&items))
            .await
    }

    pub async fn delete(&self, path: &str) -> SyncResult<()> {
        let full = self.full_path(path);
        debug!("delete {full}");
        self.with_repeat("delete", &full, || self.driver.delete(&full))
            .await
    }

    pub async fn mkdir(&self, path: &str) -> SyncResult<()> {
        let full = self.full_path(path);
        debug!("mkdir {full}");
        self.with_repeat("mkdir", &full, || self.driver.mkdir(&full)).await
    }

    pub async fn move_item(&self, from: &str, to: &str) -> SyncResult<()> {
        let (from, to) = (self.full_path(from), self.full_path(to));
        debug!("move {from} -> {to}");
        self.with_repeat("move", &from, || self.driver.move_item(&from, &to))
            .await
    }

    /// Deletes everything the driver can reach.
    pub async fn format(&self) -> SyncResult<()> {
        warn!("formatting sync target");
        self.with_repeat("format", "", || self.driver.format()).await
    }

    /// Deletes everything under the base directory.
    pub async fn clear_root(&self) -> SyncResult<()> {
        let base = self.options.base_dir.as_str();
        warn!("clearing sync target root {base:?}");
        self.with_repeat("clearRoot", base, || self.driver.clear_root(base))
            .await
    }

    /// Items changed since the cursor in `options`.
    ///
    /// Uses the driver's native delta when it has one, [`basic_delta`]
    /// otherwise.
    pub async fn delta(&self, path: &str, options: &DeltaOptions) -> SyncResult<PaginatedList<RemoteItem>> {
        if self.driver.supports_delta() {
            let full = self.full_path(path);
            let context = options.context.as_ref();
            return self
                .with_repeat("delta", &full, || self.driver.delta(&full, context))
                .await;
        }

        let stat_fn = |dir: String| async move {
            let listing = self
                .list(
                    &dir,
                    ListOptions {
                        include_hidden: true,
                        ..ListOptions::default()
                    },
                )
                .await?;
            Ok::<_, SyncError>(listing.items)
        };
        basic_delta(path, stat_fn, options).await
    }

    fn builtin_locks_unsupported() -> SyncError {
        SyncError::Unsupported("Sync target does not support built-in locks".to_string())
    }

    pub async fn acquire_lock(
        &self,
        lock_type: LockType,
        client_type: LockClientType,
        client_id: &ClientId,
    ) -> SyncResult<Lock> {
        if !self.driver.supports_locks() {
            return Err(Self::builtin_locks_unsupported());
        }
        self.with_repeat("acquireLock", "", || {
            self.driver.acquire_lock(lock_type, client_type, client_id)
        })
        .await
    }

    pub async fn release_lock(
        &self,
        lock_type: LockType,
        client_type: LockClientType,
        client_id: &ClientId,
    ) -> SyncResult<()> {
        if !self.driver.supports_locks() {
            return Err(Self::builtin_locks_unsupported());
        }
        self.with_repeat("releaseLock", "", || {
            self.driver.release_lock(lock_type, client_type, client_id)
        })
        .await
    }

    pub async fn list_locks(&self) -> SyncResult<Vec<Lock>> {
        if !self.driver.supports_locks() {
            return Err(Self::builtin_locks_unsupported());
        }
        self.with_repeat("listLocks", "", || self.driver.list_locks())
            .await
    }

    /// Current time on the remote clock, in milliseconds.
    ///
    /// The offset to the local clock is measured with a probe file and
    /// cached. If the measurement fails the local clock is used for a
    /// short while before trying again.
    pub async fn remote_date(&self) -> i64 {
        let mut clock = self.clock.lock().await;
        let now = unix_ms();
        if now >= clock.next_check_ms {
            match self.fetch_remote_date_offset().await {
                Ok(offset) => {
                    debug!(offset_ms = offset, "measured remote clock offset");
                    clock.offset_ms = offset;
                    clock.next_check_ms = now + CLOCK_CHECK_INTERVAL_MS;
                }
                Err(e) => {
                    warn!("could not retrieve remote date, using local clock: {e}");
                    clock.offset_ms = 0;
                    clock.next_check_ms = now + CLOCK_RETRY_INTERVAL_MS;
                }
            }
        }
        unix_ms() + clock.offset_ms
    }

    async fn fetch_remote_date_offset(&self) -> SyncResult<i64> {
        let probe = paths::join(paths::TEMP_DIR, &format!("timeCheck{}.txt", create_uuid()));
        let start = unix_ms();
        let deadline = tokio::time::Instant::now() + CLOCK_PROBE_TIMEOUT;
        self.put(&probe, b"timeCheck").await?;

        let result = loop {
            if let Some(stat) = self.stat(&probe).await? {
                let end = unix_ms();
                break Ok(stat.updated_time - (start + end) / 2);
            }
            if tokio::time::Instant::now() >= deadline {
                break Err(SyncError::Timeout(
                    "Timed out trying to get sync target clock time".to_string(),
                ));
            }
            tokio::time::sleep(CLOCK_PROBE_POLL).await;
        };

        // Nobody needs to wait for the probe to go away.
        let driver = Arc::clone(&self.driver);
        let full = self.full_path(&probe);
        tokio::spawn(async move {
            if let Err(e) = driver.delete(&full).await {
                debug!("could not delete clock probe {full}: {e}");
            }
        });

        result
    }
}
