use async_trait::async_trait;
use blobsync_drivers::{DriverError, DriverResult, MemoryDriver, StorageDriver};
use blobsync_sync::{
    GetItemsOptions, LockHandlerOptions, SyncError, SyncState, Synchronizer, SynchronizerConfig,
    SYNC_TARGET_VERSION,
};
use blobsync_types::{ClientId, Item, ItemStat, Lock, LockClientType, LockType, PaginatedList};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Memory driver that can lose every lock after a number of item writes,
/// or fail item reads.
struct FaultyDriver {
    inner: Arc<MemoryDriver>,
    /// Item writes left before the locks vanish. 0 when disarmed.
    writes_before_lock_loss: AtomicUsize,
    fail_item_reads: AtomicBool,
}

impl FaultyDriver {
    fn new() -> Self {
        Self {
            inner: Arc::new(MemoryDriver::new()),
            writes_before_lock_loss: AtomicUsize::new(0),
            fail_item_reads: AtomicBool::new(false),
        }
    }

    fn lose_locks_after(&self, writes: usize) {
        self.writes_before_lock_loss.store(writes, Ordering::SeqCst);
    }

    fn item_count(&self) -> usize {
        self.inner.paths().iter().filter(|p| is_item_path(p)).count()
    }

    async fn after_item_write(&self, path: &str) -> DriverResult<()> {
        if !is_item_path(path) {
            return Ok(());
        }
        let left = self.writes_before_lock_loss.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(());
        }
        self.writes_before_lock_loss.store(left - 1, Ordering::SeqCst);
        if left == 1 {
            for lock in self.inner.paths().into_iter().filter(|p| p.starts_with("locks/")) {
                self.inner.delete(&lock).await?;
            }
            // Long enough for several refresh ticks.
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        Ok(())
    }
}

fn is_item_path(path: &str) -> bool {
    path.ends_with(".md") && !path.contains('/')
}

#[async_trait]
impl StorageDriver for FaultyDriver {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn stat(&self, path: &str) -> DriverResult<Option<ItemStat>> {
        self.inner.stat(path).await
    }

    async fn list(&self, path: &str) -> DriverResult<PaginatedList<ItemStat>> {
        self.inner.list(path).await
    }

    async fn get(&self, path: &str) -> DriverResult<Option<Vec<u8>>> {
        if self.fail_item_reads.load(Ordering::SeqCst) && is_item_path(path) {
            return Err(DriverError::Storage("connection reset".to_string()));
        }
        self.inner.get(path).await
    }

    async fn put(&self, path: &str, content: &[u8]) -> DriverResult<()> {
        self.inner.put(path, content).await?;
        self.after_item_write(path).await
    }

    async fn delete(&self, path: &str) -> DriverResult<()> {
        self.inner.delete(path).await?;
        self.after_item_write(path).await
    }

    async fn mkdir(&self, path: &str) -> DriverResult<()> {
        self.inner.mkdir(path).await
    }

    async fn move_item(&self, from: &str, to: &str) -> DriverResult<()> {
        self.inner.move_item(from, to).await
    }

    async fn format(&self) -> DriverResult<()> {
        self.inner.format().await
    }

    async fn clear_root(&self, base_path: &str) -> DriverResult<()> {
        self.inner.clear_root(base_path).await
    }
}

async fn setup() -> (Arc<FaultyDriver>, Synchronizer) {
    let driver = Arc::new(FaultyDriver::new());
    let config = SynchronizerConfig {
        lock: LockHandlerOptions {
            lock_ttl_ms: 60_000,
            auto_refresh_interval_ms: 50,
            acquire_wait_interval_ms: 50,
        },
        ..SynchronizerConfig::default()
    };
    let sync = Synchronizer::new(driver.clone(), config);
    sync.migration_handler()
        .init_sync_info(SYNC_TARGET_VERSION)
        .await
        .unwrap();
    (driver, sync)
}

fn notes(count: usize) -> Vec<Item> {
    (0..count).map(|i| Item::note("", &format!("note {i}"), "")).collect()
}

// ── Lost sync lock ──────────────────────────────────────────────

#[tokio::test]
async fn create_stops_with_an_error_when_the_lock_is_lost() {
    let (driver, sync) = setup().await;
    driver.lose_locks_after(2);

    let err = sync.create_items(notes(10)).await.unwrap_err();
    assert!(matches!(err, SyncError::LockExpired(_)));
    assert_eq!(err.code(), "lockExpired");
    assert_eq!(driver.item_count(), 2);
    assert_eq!(sync.state(), SyncState::Idle);
    assert_eq!(sync.lock_handler().auto_refresh_count(), 0);
}

#[tokio::test]
async fn delete_stops_with_an_error_when_the_lock_is_lost() {
    let (driver, sync) = setup().await;
    let created = sync.create_items(notes(3)).await.unwrap();
    let ids: Vec<String> = created.created_items.iter().map(|item| item.id.clone()).collect();
    driver.lose_locks_after(1);

    let err = sync.delete_items(ids).await.unwrap_err();
    assert_eq!(err.code(), "lockExpired");
    assert_eq!(driver.item_count(), 2);
}

#[tokio::test]
async fn next_operation_runs_after_a_lost_lock() {
    let (driver, sync) = setup().await;
    driver.lose_locks_after(1);
    sync.create_items(notes(3)).await.unwrap_err();

    let output = sync.create_items(notes(2)).await.unwrap();
    assert_eq!(output.created_items.len(), 2);
    assert_eq!(driver.item_count(), 3);
}

// ── Failed downloads ────────────────────────────────────────────

#[tokio::test]
async fn failed_download_under_an_exclusive_lock_is_a_lock_error() {
    let (driver, sync) = setup().await;
    let created = sync.create_items(notes(2)).await.unwrap();
    let ids: Vec<String> = created.created_items.iter().map(|item| item.id.clone()).collect();

    let other = ClientId::new();
    driver
        .put(&Lock::path_for(LockType::Exclusive, LockClientType::Mobile, &other), b"{}")
        .await
        .unwrap();
    driver.fail_item_reads.store(true, Ordering::SeqCst);

    let err = sync
        .get_items(GetItemsOptions {
            ids,
            unserialize_all: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::LockError(_)));
    assert!(err.to_string().contains("hasExclusiveLock"));
    assert!(err.to_string().contains("connection reset"));
}

#[tokio::test]
async fn failed_download_without_a_lock_keeps_its_error() {
    let (driver, sync) = setup().await;
    let created = sync.create_items(notes(1)).await.unwrap();
    driver.fail_item_reads.store(true, Ordering::SeqCst);

    let err = sync
        .get_items(GetItemsOptions {
            ids: vec![created.created_items[0].id.clone()],
            unserialize_all: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "driverError");
}
