//! Sync target initialisation and sync info publication.

use crate::config::AcquireLockOptions;
use crate::error::SyncResult;
use crate::file_api::FileApi;
use crate::locks::{LockHandler, LockRefreshMonitor};
use crate::sync_info::{fetch_sync_info, upload_sync_info, SyncInfo};
use blobsync_types::{ClientId, LockClientType, LockType};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How long to wait for other clients to release their locks.
const EXCLUSIVE_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Changes the protocol state of the target under an Exclusive lock.
pub struct MigrationHandler {
    api: Arc<FileApi>,
    lock_handler: LockHandler,
    client_type: LockClientType,
    client_id: ClientId,
}

impl MigrationHandler {
    pub fn new(
        api: Arc<FileApi>,
        lock_handler: LockHandler,
        client_type: LockClientType,
        client_id: ClientId,
    ) -> Self {
        Self {
            api,
            lock_handler,
            client_type,
            client_id,
        }
    }

    /// Sync info of the target. Version 0 means empty, 1 legacy.
    pub async fn fetch_sync_target_info(&self) -> SyncResult<SyncInfo> {
        fetch_sync_info(&self.api).await
    }

    /// Writes a fresh sync info document of `version`.
    pub async fn init_sync_info(&self, version: u32) -> SyncResult<()> {
        info!(version, "initializing sync target");
        let result = self
            .with_exclusive_lock(move || async move {
                upload_sync_info(&self.api, &SyncInfo::new(version)).await
            })
            .await;
        if let Err(e) = &result {
            error!("Could not initialize sync target version {version}: {e}");
        }
        result
    }

    /// Merges `local` into the remote sync info and uploads the result.
    ///
    /// Fields changed more recently on the remote are kept.
    pub async fn publish_sync_info(&self, local: &SyncInfo) -> SyncResult<SyncInfo> {
        self.with_exclusive_lock(move || async move {
            let remote = fetch_sync_info(&self.api).await?;
            let merged = remote.merge(local);
            upload_sync_info(&self.api, &merged).await?;
            info!(version = merged.version(), e2ee = merged.e2ee(), "published sync info");
            Ok(merged)
        })
        .await
    }

    /// Runs `body` while holding a refreshed Exclusive lock.
    ///
    /// A refresh failure observed before or after `body` fails the call.
    /// The lock is released on every path.
    async fn with_exclusive_lock<T, F, Fut>(&self, body: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let lock = self
            .lock_handler
            .acquire_lock(
                LockType::Exclusive,
                self.client_type,
                &self.client_id,
                AcquireLockOptions {
                    clear_existing_sync_locks_from_the_same_client: true,
                    timeout_ms: EXCLUSIVE_LOCK_TIMEOUT_MS,
                },
            )
            .await?;

        let result = match self.lock_handler.start_auto_lock_refresh(&lock) {
            Ok(monitor) => run_checked(&monitor, body).await,
            Err(e) => Err(e),
        };

        self.lock_handler.stop_auto_lock_refresh(&lock);
        if let Err(e) = self
            .lock_handler
            .release_lock(LockType::Exclusive, self.client_type, &self.client_id)
            .await
        {
            warn!("could not release exclusive lock: {e}");
        }
        result
    }
}

async fn run_checked<T, F, Fut>(monitor: &LockRefreshMonitor, body: F) -> SyncResult<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    monitor.check()?;
    let value = body().await?;
    monitor.check()?;
    Ok(value)
}
