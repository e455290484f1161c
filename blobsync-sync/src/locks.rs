//! Advisory locks stored as files.
//!
//! Two kinds of lock guard the sync target:
//!
//! - **Sync** locks are shared. A client holds one while it writes items;
//!   any number of clients may hold one at the same time.
//! - **Exclusive** locks are held while the protocol itself changes
//!   (migration, sync info upgrade). At most one is active, and it excludes
//!   every Sync lock.
//!
//! A lock is active while `now - ttl <= updated_time`, `now` being the
//! remote clock. Holders keep their lock alive with an auto-refresh task.
//! Because the remote offers no atomic create, an Exclusive lock is only
//! considered won after writing it and reading the lock list back: when
//! several clients race, the oldest lock (ties broken by client id) wins.

use crate::config::{AcquireLockOptions, LockHandlerOptions};
use crate::error::{SyncError, SyncResult};
use crate::file_api::{FileApi, ListOptions};
use blobsync_types::timestamp::unix_ms;
use blobsync_types::{paths, ClientId, Lock, LockClientType, LockType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// An own Sync lock older than this is rewritten when re-acquired.
const SYNC_LOCK_REFRESH_AGE_MS: i64 = 10_000;

/// Pause between writing an Exclusive lock and reading it back.
const EXCLUSIVE_SETTLE_DELAY: Duration = Duration::from_millis(100);

fn is_expired(lock: &Lock, now: i64, lock_ttl_ms: i64) -> bool {
    now - lock_ttl_ms > lock.updated_time
}

/// Finds the active lock of `lock_type` among `locks`.
///
/// For Exclusive locks this is the winning lock (oldest, ties broken by
/// client id), returned only if it matches the optional client filters.
/// For Sync locks it is the first active lock matching the filters.
pub fn active_lock(
    locks: &[Lock],
    now: i64,
    lock_ttl_ms: i64,
    lock_type: LockType,
    client_type: Option<LockClientType>,
    client_id: Option<&ClientId>,
) -> Option<Lock> {
    let matches_client = |lock: &Lock| {
        client_type.is_none_or(|t| lock.client_type == t)
            && client_id.is_none_or(|id| &lock.client_id == id)
    };

    match lock_type {
        LockType::Exclusive => locks
            .iter()
            .filter(|lock| lock.lock_type == LockType::Exclusive && !is_expired(lock, now, lock_ttl_ms))
            .min_by(|a, b| {
                a.updated_time
                    .cmp(&b.updated_time)
                    .then_with(|| a.client_id.cmp(&b.client_id))
            })
            .filter(|lock| matches_client(lock))
            .cloned(),
        LockType::Sync => locks
            .iter()
            .find(|lock| {
                lock.lock_type == LockType::Sync
                    && matches_client(lock)
                    && !is_expired(lock, now, lock_ttl_ms)
            })
            .cloned(),
    }
}

fn client_string(lock: &Lock) -> String {
    format!("({} #{})", lock.client_type, lock.client_id)
}

fn refresh_key(lock_type: LockType, client_type: LockClientType, client_id: &ClientId) -> String {
    format!("{}_{}_{}", lock_type.code(), client_type.code(), client_id)
}

/// Why an auto-refresh task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The lock was gone or expired when the task looked for it.
    Expired,
    /// Re-acquiring the lock failed.
    Failed { code: &'static str, message: String },
}

impl RefreshFailure {
    pub fn into_error(self) -> SyncError {
        match self {
            Self::Expired => SyncError::LockExpired("Lock has expired".to_string()),
            Self::Failed { message, .. } => SyncError::LockError(message),
        }
    }
}

/// Observes an auto-refresh task. Reports at most one failure.
#[derive(Debug, Clone)]
pub struct LockRefreshMonitor {
    rx: watch::Receiver<Option<RefreshFailure>>,
}

impl LockRefreshMonitor {
    /// The failure, if the task has stopped because of one.
    pub fn failure(&self) -> Option<RefreshFailure> {
        self.rx.borrow().clone()
    }

    pub fn has_failed(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Returns the failure as an error, if any.
    pub fn check(&self) -> SyncResult<()> {
        match self.failure() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }

    /// Waits until the task fails. Returns `None` if it was stopped instead.
    pub async fn failed(&mut self) -> Option<RefreshFailure> {
        loop {
            if let Some(failure) = self.failure() {
                return Some(failure);
            }
            if self.rx.changed().await.is_err() {
                return self.failure();
            }
        }
    }
}

/// Acquires, releases and refreshes locks on the sync target.
///
/// Cheap to clone; clones share the refresh tasks.
#[derive(Clone)]
pub struct LockHandler {
    api: Arc<FileApi>,
    options: LockHandlerOptions,
    refresh_tasks: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl LockHandler {
    pub fn new(api: Arc<FileApi>, options: LockHandlerOptions) -> Self {
        Self {
            api,
            options,
            refresh_tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn options(&self) -> &LockHandlerOptions {
        &self.options
    }

    pub fn lock_ttl_ms(&self) -> i64 {
        i64::try_from(self.options.lock_ttl_ms).unwrap_or(i64::MAX)
    }

    /// Whether the driver's own lock primitives are used instead of files.
    pub fn use_builtin_locks(&self) -> bool {
        self.api.supports_locks()
    }

    /// Lists the locks on the target, optionally of one type.
    ///
    /// Files in the lock directory that are not valid lock names are
    /// ignored.
    pub async fn locks(&self, lock_type: Option<LockType>) -> SyncResult<Vec<Lock>> {
        let locks = if self.use_builtin_locks() {
            self.api.list_locks().await?
        } else {
            let listing = self
                .api
                .list(
                    paths::LOCK_DIR,
                    ListOptions {
                        include_dirs: false,
                        ..ListOptions::default()
                    },
                )
                .await?;
            listing
                .items
                .iter()
                .filter_map(|stat| match Lock::from_file_name(&stat.path, stat.updated_time) {
                    Ok(lock) => Some(lock),
                    Err(e) => {
                        debug!("skipping lock directory entry: {e}");
                        None
                    }
                })
                .collect()
        };
        Ok(locks
            .into_iter()
            .filter(|lock| lock_type.is_none_or(|t| lock.lock_type == t))
            .collect())
    }

    /// True if the given client holds an active lock of `lock_type`.
    pub async fn has_active_lock(
        &self,
        lock_type: LockType,
        client_type: LockClientType,
        client_id: &ClientId,
    ) -> SyncResult<bool> {
        let locks = self.locks(Some(lock_type)).await?;
        let now = self.api.remote_date().await;
        Ok(active_lock(
            &locks,
            now,
            self.lock_ttl_ms(),
            lock_type,
            Some(client_type),
            Some(client_id),
        )
        .is_some())
    }

    /// Acquires a lock, or refreshes it if the client already holds it.
    pub async fn acquire_lock(
        &self,
        lock_type: LockType,
        client_type: LockClientType,
        client_id: &ClientId,
        options: AcquireLockOptions,
    ) -> SyncResult<Lock> {
        if self.use_builtin_locks() {
            return self.api.acquire_lock(lock_type, client_type, client_id).await;
        }

        let result = match lock_type {
            LockType::Sync => self.try_acquire_sync_lock(client_type, client_id, options).await,
            LockType::Exclusive => {
                self.try_acquire_exclusive_lock(client_type, client_id, options)
                    .await
            }
        };
        match result {
            Ok(lock) => {
                debug!(%lock, "acquired lock");
                Ok(lock)
            }
            Err(e) => {
                // Do not leave a half-acquired lock behind.
                if let Err(release_error) = self.release_lock(lock_type, client_type, client_id).await {
                    warn!("could not release lock after failed acquisition: {release_error}");
                }
                Err(e)
            }
        }
    }

    async fn try_acquire_sync_lock(
        &self,
        client_type: LockClientType,
        client_id: &ClientId,
        options: AcquireLockOptions,
    ) -> SyncResult<Lock> {
        let started = Instant::now();
        let mut first_pass = true;
        loop {
            let locks = self.locks(None).await?;
            let now = self.api.remote_date().await;
            let ttl = self.lock_ttl_ms();

            if let Some(exclusive) = active_lock(&locks, now, ttl, LockType::Exclusive, None, None) {
                if self.wait_for_timeout(started, options.timeout_ms).await {
                    continue;
                }
                return Err(SyncError::HasExclusiveLock(format!(
                    "Cannot acquire sync lock because the following client has an exclusive lock on the sync target: {}",
                    client_string(&exclusive)
                )));
            }

            if let Some(own) = active_lock(&locks, now, ttl, LockType::Sync, Some(client_type), Some(client_id)) {
                if first_pass || now - own.updated_time > SYNC_LOCK_REFRESH_AGE_MS {
                    self.save_lock(LockType::Sync, client_type, client_id).await?;
                }
                return Ok(own);
            }

            if !first_pass {
                return Err(SyncError::LockError(
                    "Cannot acquire sync lock: either the lock could be written but not read back. Or it was expired before it was read again."
                        .to_string(),
                ));
            }

            self.save_lock(LockType::Sync, client_type, client_id).await?;
            first_pass = false;
        }
    }

    async fn try_acquire_exclusive_lock(
        &self,
        client_type: LockClientType,
        client_id: &ClientId,
        options: AcquireLockOptions,
    ) -> SyncResult<Lock> {
        let started = Instant::now();
        let mut just_written = false;
        loop {
            let locks = self.locks(None).await?;
            let now = self.api.remote_date().await;
            let ttl = self.lock_ttl_ms();

            if let Some(sync) = active_lock(&locks, now, ttl, LockType::Sync, None, None) {
                if options.clear_existing_sync_locks_from_the_same_client && &sync.client_id == client_id {
                    info!("clearing own sync lock before taking the exclusive lock");
                    self.release_lock(LockType::Sync, sync.client_type, &sync.client_id)
                        .await?;
                    continue;
                }
                if self.wait_for_timeout(started, options.timeout_ms).await {
                    continue;
                }
                return Err(SyncError::HasSyncLock(format!(
                    "Cannot acquire exclusive lock because the following clients have a sync lock on the target: {}",
                    client_string(&sync)
                )));
            }

            match active_lock(&locks, now, ttl, LockType::Exclusive, None, None) {
                Some(lock) if lock.is_owned_by(client_type, client_id) => {
                    // Rewriting a lock we have just won would make it younger
                    // than a competitor's, handing that competitor the win too.
                    if !just_written {
                        self.save_lock(LockType::Exclusive, client_type, client_id)
                            .await?;
                    }
                    return Ok(lock);
                }
                Some(lock) => {
                    if self.wait_for_timeout(started, options.timeout_ms).await {
                        continue;
                    }
                    return Err(SyncError::HasExclusiveLock(format!(
                        "Cannot acquire exclusive lock because the following client has an exclusive lock on the sync target: {}",
                        client_string(&lock)
                    )));
                }
                None => {
                    // Write, then loop to check that the lock we wrote is the winner.
                    self.save_lock(LockType::Exclusive, client_type, client_id)
                        .await?;
                    just_written = true;
                    tokio::time::sleep(EXCLUSIVE_SETTLE_DELAY).await;
                }
            }
        }
    }

    /// Sleeps one wait interval if the timeout allows it.
    async fn wait_for_timeout(&self, started: Instant, timeout_ms: u64) -> bool {
        if timeout_ms == 0 || started.elapsed() >= Duration::from_millis(timeout_ms) {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(self.options.acquire_wait_interval_ms)).await;
        true
    }

    async fn save_lock(
        &self,
        lock_type: LockType,
        client_type: LockClientType,
        client_id: &ClientId,
    ) -> SyncResult<()> {
        let lock = Lock::new(lock_type, client_type, client_id.clone(), unix_ms());
        let content = serde_json::to_vec(&lock)?;
        self.api.put(&lock.path(), &content).await
    }

    /// Deletes the client's lock file. Releasing a missing lock is a no-op.
    pub async fn release_lock(
        &self,
        lock_type: LockType,
        client_type: LockClientType,
        client_id: &ClientId,
    ) -> SyncResult<()> {
        if self.use_builtin_locks() {
            return self.api.release_lock(lock_type, client_type, client_id).await;
        }
        debug!(%lock_type, %client_type, %client_id, "releasing lock");
        self.api
            .delete(&Lock::path_for(lock_type, client_type, client_id))
            .await
    }

    /// Keeps `lock` alive in the background.
    ///
    /// Each tick checks that the lock is still active and re-acquires it.
    /// A lock that has expired is never silently re-taken, since another
    /// client may have changed the target in the meantime: the task stops
    /// and reports the failure on the returned monitor.
    pub fn start_auto_lock_refresh(&self, lock: &Lock) -> SyncResult<LockRefreshMonitor> {
        let key = refresh_key(lock.lock_type, lock.client_type, &lock.client_id);
        let mut tasks = self.refresh_tasks.lock();
        if tasks.contains_key(&key) {
            return Err(SyncError::InvalidInput(format!(
                "There is already a timer refreshing this lock: {key}"
            )));
        }

        let (tx, rx) = watch::channel(None);
        let handler = self.clone();
        let lock = lock.clone();
        let period = Duration::from_millis(self.options.auto_refresh_interval_ms.max(1));
        let task_key = key.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(failure) = handler.refresh_once(&lock).await {
                    warn!(%lock, ?failure, "lock auto-refresh stopped");
                    handler.refresh_tasks.lock().remove(&task_key);
                    let _ = tx.send(Some(failure));
                    break;
                }
            }
        });
        tasks.insert(key, task);
        Ok(LockRefreshMonitor { rx })
    }

    async fn refresh_once(&self, lock: &Lock) -> Result<(), RefreshFailure> {
        let failed = |e: SyncError| RefreshFailure::Failed {
            code: e.code(),
            message: e.to_string(),
        };
        let active = self
            .has_active_lock(lock.lock_type, lock.client_type, &lock.client_id)
            .await
            .map_err(failed)?;
        if !active {
            return Err(RefreshFailure::Expired);
        }
        self.acquire_lock(
            lock.lock_type,
            lock.client_type,
            &lock.client_id,
            AcquireLockOptions::default(),
        )
        .await
        .map_err(failed)?;
        debug!(%lock, "refreshed lock");
        Ok(())
    }

    /// Stops refreshing `lock`. Does nothing if no task is running.
    pub fn stop_auto_lock_refresh(&self, lock: &Lock) {
        let key = refresh_key(lock.lock_type, lock.client_type, &lock.client_id);
        if let Some(task) = self.refresh_tasks.lock().remove(&key) {
            task.abort();
        }
    }

    /// Number of running refresh tasks.
    pub fn auto_refresh_count(&self) -> usize {
        self.refresh_tasks.lock().len()
    }
}
