//! The synchronizer.
//!
//! Item-level create/read/update/delete against a sync target with
//! optimistic concurrency: an update names the `updated_time` the caller
//! last saw, and is refused if the remote moved on since. Mutations run
//! under a refreshed Sync lock; every remote call is checked against the
//! lock state so that a client whose lock was lost stops writing.

use crate::config::{AcquireLockOptions, DeltaOptions, SynchronizerConfig, MAX_CREATE_BATCH};
use crate::e2ee::{self, E2eeInfo};
use crate::error::{SyncError, SyncResult};
use crate::file_api::FileApi;
use crate::locks::{active_lock, LockHandler, LockRefreshMonitor, RefreshFailure};
use crate::migration::MigrationHandler;
use crate::sync_info::{fetch_sync_info, SyncInfo, SYNC_TARGET_VERSION};
use crate::task_queue::TaskQueue;
use blobsync_crypto::EncryptionService;
use blobsync_drivers::{DriverError, StorageDriver};
use blobsync_types::timestamp::unix_ms;
use blobsync_types::{
    create_uuid, paths, ClientId, DeltaContext, Item, ItemCodec, ItemType, Lock, LockClientType,
    LockType, MarkdownCodec, PaginatedList, RemoteItem,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const E2EE_MISMATCH_MESSAGE: &str =
    "There's a change in remote encryption settings, please fetch and update your e2e input to match the remote's";
const PPK_MISMATCH_MESSAGE: &str =
    "There's a change in encryption key (ppk) settings, please fetch and update your e2e input to match the remote's";

/// Whether the synchronizer is running an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Idle,
    InProgress,
}

/// Progress of the current (or last) operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub operation: String,
    pub started_time: i64,
    pub completed_time: Option<i64>,
    pub items_total: usize,
    pub items_done: usize,
    pub items_failed: usize,
    pub cancelled: bool,
}

/// Result of a sync info verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    Succeeded,
    /// Local and remote encryption settings disagree.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub status: VerifyStatus,
    pub message: String,
    /// Remote sync info without key material.
    pub remote_info: Option<SyncInfo>,
    /// Encryption settings to sync with, on success.
    pub e2ee: Option<E2eeInfo>,
}

impl VerifyOutcome {
    fn succeeded(message: &str, remote_info: Option<SyncInfo>, e2ee: E2eeInfo) -> Self {
        Self {
            status: VerifyStatus::Succeeded,
            message: message.to_string(),
            remote_info,
            e2ee: Some(e2ee),
        }
    }

    fn aborted(message: &str, remote_info: SyncInfo) -> Self {
        Self {
            status: VerifyStatus::Aborted,
            message: message.to_string(),
            remote_info: Some(remote_info),
            e2ee: None,
        }
    }
}

/// An item that could not be uploaded.
#[derive(Debug)]
pub struct FailedItem {
    pub item: Item,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct CreateItemsOutput {
    pub created_items: Vec<Item>,
    pub failed_items: Vec<FailedItem>,
}

/// Outcome of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Succeeded,
    /// The remote changed after `last_sync`.
    Conflicted,
    /// `last_sync` is newer than the remote item.
    InaccurateTimestamp,
}

impl UpdateStatus {
    pub fn code(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Conflicted => "conflicted",
            Self::InaccurateTimestamp => "inaccurateTimestamp",
        }
    }

    pub fn is_conflict(self) -> bool {
        !matches!(self, Self::Succeeded)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemOutput {
    pub status: UpdateStatus,
    pub message: String,
    /// Remote item, when the update was refused as conflicted.
    pub remote_item: Option<Item>,
    pub new_item: Option<Item>,
    pub old_item: Option<Item>,
    /// Pass this as `last_sync` for the next update of the item.
    pub new_sync_time: Option<i64>,
}

impl UpdateItemOutput {
    fn refused(status: UpdateStatus, message: &str, remote_item: Option<Item>) -> Self {
        Self {
            status,
            message: message.to_string(),
            remote_item,
            new_item: None,
            old_item: None,
            new_sync_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Succeeded,
    ItemNotFound,
    ReadOnly,
    Failed,
}

impl DeleteStatus {
    pub fn message(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::ItemNotFound => "item not found",
            Self::ReadOnly => "read-only item can't be deleted",
            Self::Failed => "could not delete item",
        }
    }
}

/// An item to delete. The type is optional; resources are also recognised
/// from the remote copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItem {
    pub id: String,
    pub item_type: Option<ItemType>,
}

impl From<String> for DeleteItem {
    fn from(id: String) -> Self {
        Self { id, item_type: None }
    }
}

impl From<&str> for DeleteItem {
    fn from(id: &str) -> Self {
        Self::from(id.to_string())
    }
}

impl From<&Item> for DeleteItem {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            item_type: Some(item.item_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemOutput {
    /// The item as the caller passed it.
    pub item: DeleteItem,
    pub status: DeleteStatus,
    pub error: Option<String>,
}

/// Which item to fetch. `id` takes precedence over `path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetItemOptions {
    pub id: Option<String>,
    pub path: Option<String>,
    pub unserialize: bool,
}

impl GetItemOptions {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn by_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn unserialized(mut self) -> Self {
        self.unserialize = true;
        self
    }
}

/// A fetched item, raw or parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum GetItemOutput {
    Raw(Vec<u8>),
    Item(Item),
}

impl GetItemOutput {
    pub fn into_item(self) -> Option<Item> {
        match self {
            Self::Item(item) => Some(item),
            Self::Raw(_) => None,
        }
    }

    pub fn into_raw(self) -> Option<Vec<u8>> {
        match self {
            Self::Raw(raw) => Some(raw),
            Self::Item(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetItemsOptions {
    pub ids: Vec<String>,
    pub unserialize_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemsMetadataOptions {
    pub context: Option<DeltaContext>,
    pub all_item_ids: Vec<String>,
    pub track_deleted_items: bool,
    /// Refuse to report most known items as deleted. On by default.
    pub wipe_out_fail_safe: bool,
    /// 0 uses the default page size.
    pub output_limit: usize,
}

impl Default for GetItemsMetadataOptions {
    fn default() -> Self {
        Self {
            context: None,
            all_item_ids: Vec::new(),
            track_deleted_items: false,
            wipe_out_fail_safe: true,
            output_limit: 0,
        }
    }
}

/// Marks the synchronizer busy for the lifetime of an operation.
struct OperationGuard<'a> {
    sync: &'a Synchronizer,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        let cancelled = self.sync.cancelling.load(Ordering::SeqCst);
        {
            let mut progress = self.sync.progress.lock();
            progress.completed_time = Some(unix_ms());
            progress.cancelled = cancelled;
        }
        if let Some(queue) = self.sync.download_queue.lock().take() {
            queue.stop();
        }
        self.sync.state.send_replace(SyncState::Idle);
    }
}

/// Item-level sync client of one sync target.
pub struct Synchronizer {
    api: Arc<FileApi>,
    lock_handler: LockHandler,
    migration_handler: MigrationHandler,
    codec: Arc<dyn ItemCodec>,
    encryption: Option<Arc<dyn EncryptionService>>,
    config: SynchronizerConfig,
    e2ee: RwLock<E2eeInfo>,
    state: watch::Sender<SyncState>,
    cancelling: AtomicBool,
    sync_target_is_locked: AtomicBool,
    holds_sync_lock: AtomicBool,
    refresh_monitor: Mutex<Option<LockRefreshMonitor>>,
    download_queue: Mutex<Option<Arc<TaskQueue<Option<GetItemOutput>>>>>,
    progress: Mutex<ProgressReport>,
}

impl Synchronizer {
    pub fn new(driver: Arc<dyn StorageDriver>, config: SynchronizerConfig) -> Self {
        let api = Arc::new(FileApi::new(driver, config.file_api.clone()));
        let lock_handler = LockHandler::new(Arc::clone(&api), config.lock.clone());
        let migration_handler = MigrationHandler::new(
            Arc::clone(&api),
            lock_handler.clone(),
            config.client_type,
            config.client_id.clone(),
        );
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            api,
            lock_handler,
            migration_handler,
            codec: Arc::new(MarkdownCodec),
            encryption: None,
            config,
            e2ee: RwLock::new(E2eeInfo::disabled()),
            state,
            cancelling: AtomicBool::new(false),
            sync_target_is_locked: AtomicBool::new(false),
            holds_sync_lock: AtomicBool::new(false),
            refresh_monitor: Mutex::new(None),
            download_queue: Mutex::new(None),
            progress: Mutex::new(ProgressReport::default()),
        }
    }

    /// Replaces the item codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ItemCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Sets the service used when end-to-end encryption is enabled.
    #[must_use]
    pub fn with_encryption_service(mut self, service: Arc<dyn EncryptionService>) -> Self {
        self.encryption = Some(service);
        self
    }

    pub fn api(&self) -> &Arc<FileApi> {
        &self.api
    }

    pub fn lock_handler(&self) -> &LockHandler {
        &self.lock_handler
    }

    pub fn migration_handler(&self) -> &MigrationHandler {
        &self.migration_handler
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.config
    }

    pub fn client_id(&self) -> &ClientId {
        &self.config.client_id
    }

    pub fn client_type(&self) -> LockClientType {
        self.config.client_type
    }

    /// Encryption settings currently in use.
    pub fn e2ee_info(&self) -> E2eeInfo {
        self.e2ee.read().clone()
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn progress_report(&self) -> ProgressReport {
        self.progress.lock().clone()
    }

    // ── Operation state ─────────────────────────────────────────

    fn begin_operation(&self, name: &str, items_total: usize) -> OperationGuard<'_> {
        self.cancelling.store(false, Ordering::SeqCst);
        self.sync_target_is_locked.store(false, Ordering::SeqCst);
        *self.progress.lock() = ProgressReport {
            operation: name.to_string(),
            started_time: unix_ms(),
            items_total,
            ..ProgressReport::default()
        };
        self.state.send_replace(SyncState::InProgress);
        OperationGuard { sync: self }
    }

    fn record_progress(&self, failed: bool) {
        let mut progress = self.progress.lock();
        progress.items_done += 1;
        if failed {
            progress.items_failed += 1;
        }
    }

    /// Stops the current operation and waits until it has returned.
    ///
    /// Batch loops finish the item they are working on and return what
    /// they have done so far; queued downloads are aborted.
    pub async fn cancel(&self) {
        if self.state() == SyncState::Idle {
            return;
        }
        info!("cancelling sync operation");
        self.cancelling.store(true, Ordering::SeqCst);
        if let Some(queue) = self.download_queue.lock().clone() {
            queue.stop();
        }
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == SyncState::Idle).await;
    }

    /// The failure of the lock refresh task, if any. Flags the target as
    /// locked so that no further remote call is made.
    fn lock_failure(&self) -> Option<RefreshFailure> {
        let failure = self
            .refresh_monitor
            .lock()
            .as_ref()
            .and_then(LockRefreshMonitor::failure)?;
        if !self.sync_target_is_locked.swap(true, Ordering::SeqCst) {
            warn!(?failure, "could not refresh lock, aborting sync");
        }
        Some(failure)
    }

    /// Checked between the items of a batch. Fails if the lock was lost;
    /// returns true if the caller cancelled.
    fn check_batch(&self) -> SyncResult<bool> {
        if let Some(failure) = self.lock_failure() {
            return Err(failure.into_error());
        }
        Ok(self.cancelling.load(Ordering::SeqCst))
    }

    // ── Locks ───────────────────────────────────────────────────

    async fn acquire_sync_lock(&self) -> SyncResult<Lock> {
        let lock = self
            .lock_handler
            .acquire_lock(
                LockType::Sync,
                self.config.client_type,
                &self.config.client_id,
                AcquireLockOptions::default(),
            )
            .await?;
        match self.lock_handler.start_auto_lock_refresh(&lock) {
            Ok(monitor) => {
                *self.refresh_monitor.lock() = Some(monitor);
                self.holds_sync_lock.store(true, Ordering::SeqCst);
                Ok(lock)
            }
            Err(e) => {
                self.release_sync_lock(&lock).await;
                Err(e)
            }
        }
    }

    async fn release_sync_lock(&self, lock: &Lock) {
        self.holds_sync_lock.store(false, Ordering::SeqCst);
        self.lock_handler.stop_auto_lock_refresh(lock);
        self.refresh_monitor.lock().take();
        if let Err(e) = self
            .lock_handler
            .release_lock(LockType::Sync, self.config.client_type, &self.config.client_id)
            .await
        {
            warn!("could not release sync lock: {e}");
        }
    }

    /// Runs `body` under a refreshed Sync lock, releasing it on every path.
    async fn with_sync_lock<T, F, Fut>(&self, body: F) -> SyncResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let lock = self.acquire_sync_lock().await?;
        let result = body().await;
        self.release_sync_lock(&lock).await;
        result
    }

    /// Runs a remote call, translating failures caused by a lost lock.
    async fn api_call<T>(&self, call: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        self.lock_failure();
        if self.sync_target_is_locked.load(Ordering::SeqCst) {
            return Err(SyncError::LockError(
                "Sync target is locked - aborting API call".to_string(),
            ));
        }
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.with_lock_status(e).await),
        }
    }

    /// Rewraps `e` as a lock error when the lock state explains it.
    async fn with_lock_status(&self, e: SyncError) -> SyncError {
        match self.lock_error_status().await {
            Some(status) => SyncError::LockError(format!(
                "Sync target lock error: {status}. Original error was: {e}"
            )),
            None => e,
        }
    }

    async fn lock_error_status(&self) -> Option<&'static str> {
        let locks = match self.lock_handler.locks(None).await {
            Ok(locks) => locks,
            Err(e) => {
                debug!("could not list locks while checking a failed call: {e}");
                return None;
            }
        };
        let now = self.api.remote_date().await;
        let ttl = self.lock_handler.lock_ttl_ms();
        if active_lock(&locks, now, ttl, LockType::Exclusive, None, None).is_some() {
            return Some("hasExclusiveLock");
        }
        let own_sync_lock = active_lock(
            &locks,
            now,
            ttl,
            LockType::Sync,
            Some(self.config.client_type),
            Some(&self.config.client_id),
        );
        if self.holds_sync_lock.load(Ordering::SeqCst) && own_sync_lock.is_none() {
            return Some("syncLockGone");
        }
        None
    }

    // ── Sync info and encryption ────────────────────────────────

    /// Checks that the target is initialised, supported and encrypted the
    /// way `local` says.
    pub async fn verify_sync_info(&self, local: &E2eeInfo) -> SyncResult<VerifyOutcome> {
        self.api.initialize().await?;
        let info = fetch_sync_info(&self.api).await?;
        match info.version() {
            0 => return Err(SyncError::NotInitialized),
            SYNC_TARGET_VERSION => {}
            other => return Err(SyncError::UnsupportedVersion(other)),
        }
        info.check_if_can_sync(&self.config.app_version)?;

        let filtered = info.filtered();
        if local.e2ee != info.e2ee() {
            return Ok(VerifyOutcome::aborted(E2EE_MISMATCH_MESSAGE, filtered));
        }
        if !info.e2ee() {
            return Ok(VerifyOutcome::succeeded(
                "Sync info verified with disabled encryption",
                None,
                E2eeInfo::disabled(),
            ));
        }

        let remote_ppk_id = info.ppk().map(|p| p.id.as_str());
        if local.ppk_id() != remote_ppk_id {
            return Ok(VerifyOutcome::aborted(PPK_MISMATCH_MESSAGE, filtered));
        }
        let adopted = E2eeInfo {
            e2ee: true,
            ppk: local.ppk.clone(),
            active_master_key_id: info.active_master_key_id().map(str::to_string),
        };
        Ok(VerifyOutcome::succeeded(
            "Sync info verified with enabled encryption",
            Some(filtered),
            adopted,
        ))
    }

    /// Verifies `local` and, on success, syncs with it from now on.
    pub async fn setup_e2e(&self, local: E2eeInfo) -> SyncResult<VerifyOutcome> {
        let outcome = self.verify_sync_info(&local).await?;
        if let Some(adopted) = &outcome.e2ee {
            self.adopt_e2ee(adopted.clone());
        }
        Ok(outcome)
    }

    fn adopt_e2ee(&self, info: E2eeInfo) {
        if let Some(service) = &self.encryption
            && info.e2ee
        {
            service.set_active_master_key_id(info.active_master_key_id.clone());
        }
        *self.e2ee.write() = info;
    }

    /// Verifies the stored encryption settings before an operation.
    async fn ensure_verified(&self) -> SyncResult<()> {
        let local = self.e2ee_info();
        let outcome = self.verify_sync_info(&local).await?;
        match (outcome.status, outcome.e2ee) {
            (VerifyStatus::Succeeded, Some(adopted)) => {
                self.adopt_e2ee(adopted);
                Ok(())
            }
            (VerifyStatus::Succeeded, None) => Ok(()),
            (VerifyStatus::Aborted, _) => Err(SyncError::E2eeMismatch(outcome.message)),
        }
    }

    /// The encryption service, if encryption is enabled.
    fn encryption(&self) -> SyncResult<Option<Arc<dyn EncryptionService>>> {
        if !self.e2ee.read().e2ee {
            return Ok(None);
        }
        match &self.encryption {
            Some(service) => Ok(Some(Arc::clone(service))),
            None => Err(SyncError::InvalidInput(
                "End-to-end encryption is enabled but no encryption service is configured".to_string(),
            )),
        }
    }

    fn serialize_for_sync(&self, item: &Item) -> SyncResult<String> {
        let service = self.encryption()?;
        e2ee::serialize_for_sync(item, self.codec.as_ref(), service.as_deref())
    }

    fn unserialize(&self, content: &[u8]) -> SyncResult<Item> {
        let service = self.encryption()?;
        e2ee::unserialize_for_sync(content, self.codec.as_ref(), service.as_deref())
    }

    // ── Reads ───────────────────────────────────────────────────

    async fn fetch_item(&self, options: &GetItemOptions) -> SyncResult<Option<GetItemOutput>> {
        let path = match (&options.id, &options.path) {
            (Some(id), _) => paths::item_path(id),
            (None, Some(path)) => path.clone(),
            (None, None) => {
                return Err(SyncError::InvalidInput(
                    "Either an id or a path is required".to_string(),
                ));
            }
        };
        let Some(content) = self.api_call(self.api.get(&path)).await? else {
            return Ok(None);
        };
        if options.unserialize {
            return Ok(Some(GetItemOutput::Item(self.unserialize(&content)?)));
        }
        Ok(Some(GetItemOutput::Raw(content)))
    }

    /// Fetches one item by id or path.
    pub async fn get_item(&self, options: GetItemOptions) -> SyncResult<Option<GetItemOutput>> {
        self.ensure_verified().await?;
        let _operation = self.begin_operation("getItem", 1);
        let output = self.fetch_item(&options).await;
        self.record_progress(output.is_err());
        output
    }

    /// Fetches several items concurrently. Results are aligned with `ids`;
    /// a cancelled call returns the results gathered so far.
    pub async fn get_items(&self, options: GetItemsOptions) -> SyncResult<Vec<Option<GetItemOutput>>> {
        self.ensure_verified().await?;
        let _operation = self.begin_operation("getItems", options.ids.len());

        let queue = Arc::new(TaskQueue::new("getItems", self.config.download_concurrency));
        *self.download_queue.lock() = Some(Arc::clone(&queue));
        let service = if options.unserialize_all { self.encryption()? } else { None };

        let mut queued = HashSet::new();
        for id in &options.ids {
            if !queued.insert(id.as_str()) {
                continue;
            }
            let path = paths::item_path(id);
            let api = Arc::clone(&self.api);
            let codec = Arc::clone(&self.codec);
            let service = service.clone();
            let unserialize = options.unserialize_all;
            queue.push(id.clone(), async move {
                let Some(content) = api.get(&path).await? else {
                    return Ok(None);
                };
                if unserialize {
                    let item = e2ee::unserialize_for_sync(&content, codec.as_ref(), service.as_deref())?;
                    return Ok(Some(GetItemOutput::Item(item)));
                }
                Ok(Some(GetItemOutput::Raw(content)))
            });
        }

        let mut fetched: HashMap<&str, Option<GetItemOutput>> = HashMap::new();
        let mut output = Vec::with_capacity(options.ids.len());
        for id in &options.ids {
            if self.check_batch()? {
                break;
            }
            let result = match fetched.get(id.as_str()) {
                Some(result) => result.clone(),
                None => match queue.wait_for_result(id).await {
                    Ok(result) => {
                        fetched.insert(id.as_str(), result.clone());
                        result
                    }
                    Err(SyncError::Cancelled) => break,
                    Err(e) => {
                        queue.stop();
                        return Err(self.with_lock_status(e).await);
                    }
                },
            };
            self.record_progress(false);
            output.push(result);
        }
        queue.stop();
        Ok(output)
    }

    /// Downloads and decrypts the blob of a resource.
    pub async fn get_blob(&self, id: &str) -> SyncResult<Vec<u8>> {
        self.ensure_verified().await?;
        let _operation = self.begin_operation("getBlob", 1);

        let item = self
            .fetch_item(&GetItemOptions::by_id(id).unserialized())
            .await?
            .and_then(GetItemOutput::into_item)
            .ok_or_else(|| SyncError::ItemNotFound(id.to_string()))?;
        if !item.is_resource() {
            return Err(SyncError::InvalidInput(format!("Item is not a resource: {id}")));
        }

        let blob_path = paths::resource_path(id);
        let content = self
            .api_call(self.api.get(&blob_path))
            .await?
            .ok_or_else(|| SyncError::FileNotFound(format!("Blob not found in path: {blob_path}")))?;
        let service = self.encryption()?;
        let blob = e2ee::decrypt_blob(&item, content, service.as_deref())?;
        self.record_progress(false);
        Ok(blob)
    }

    /// Lists changes since the cursor in `options`.
    pub async fn get_items_metadata(
        &self,
        options: GetItemsMetadataOptions,
    ) -> SyncResult<PaginatedList<RemoteItem>> {
        self.ensure_verified().await?;
        let _operation = self.begin_operation("getItemsMetadata", 0);
        let defaults = DeltaOptions::default();
        let delta_options = DeltaOptions {
            context: options.context,
            all_item_ids: options.all_item_ids,
            track_deleted_items: options.track_deleted_items,
            wipe_out_fail_safe: options.wipe_out_fail_safe,
            output_limit: if options.output_limit == 0 {
                defaults.output_limit
            } else {
                options.output_limit
            },
            ..defaults
        };
        self.api_call(self.api.delta("", &delta_options)).await
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Uploads new items (at most 10).
    ///
    /// Items that fail individually are reported in `failed_items`; lock
    /// problems and a path seen twice in the batch fail the whole call.
    /// Master keys are published through the sync info, so they are
    /// reported as created without being uploaded.
    pub async fn create_items(&self, items: Vec<Item>) -> SyncResult<CreateItemsOutput> {
        self.ensure_verified().await?;
        if items.is_empty() {
            return Err(SyncError::InvalidInput(
                "Items are required, and must be an array".to_string(),
            ));
        }
        if items.len() > MAX_CREATE_BATCH {
            return Err(SyncError::InvalidInput(format!(
                "Maximum {MAX_CREATE_BATCH} items can be created at once"
            )));
        }

        let _operation = self.begin_operation("createItems", items.len());
        let output = self
            .with_sync_lock(|| self.create_items_locked(items))
            .await?;
        info!(
            created = output.created_items.len(),
            failed = output.failed_items.len(),
            "created items"
        );
        Ok(output)
    }

    async fn create_items_locked(&self, items: Vec<Item>) -> SyncResult<CreateItemsOutput> {
        let mut output = CreateItemsOutput::default();
        let mut done_paths = HashSet::new();

        for mut item in items {
            if self.check_batch()? {
                info!("create cancelled, returning partial result");
                break;
            }
            if item.item_type == ItemType::MasterKey {
                debug!(id = %item.id, "master keys are published through sync info, not uploading");
                self.record_progress(false);
                output.created_items.push(item);
                continue;
            }

            if item.id.is_empty() {
                item.id = create_uuid();
            }
            item.stamp(unix_ms());

            let path = paths::item_path(&item.id);
            if !done_paths.insert(path.clone()) {
                return Err(SyncError::ProcessingPathTwice(path));
            }

            match self.create_one(&mut item, &path).await {
                Ok(()) => {
                    debug!(id = %item.id, "created item");
                    self.record_progress(false);
                    output.created_items.push(item);
                }
                Err(e) if e.is_contention() => return Err(e),
                Err(e) => {
                    warn!(id = %item.id, "could not create item: {e}");
                    self.record_progress(true);
                    output.failed_items.push(FailedItem { item, error: e });
                }
            }
        }
        Ok(output)
    }

    async fn create_one(&self, item: &mut Item, path: &str) -> SyncResult<()> {
        if self.api_call(self.api.stat(path)).await?.is_some() {
            return Err(SyncError::RemoteItemExists(path.to_string()));
        }
        if item.is_resource() {
            self.upload_blob(item).await?;
        }
        let content = self.serialize_for_sync(item)?;
        self.api_call(self.api.put(path, content.as_bytes())).await
    }

    /// Uploads the local blob of a resource, encrypting it if needed, and
    /// fills in `size`.
    async fn upload_blob(&self, item: &mut Item) -> SyncResult<()> {
        let local_path: PathBuf = item
            .local_blob_path
            .clone()
            .ok_or_else(|| SyncError::InvalidInput(format!("Resource has no local blob: {}", item.id)))?;
        let metadata = tokio::fs::metadata(&local_path).await.map_err(|_| {
            SyncError::FileNotFound(format!("Blob not found in path: {}", local_path.display()))
        })?;
        item.size = Some(metadata.len());
        if let Some(max) = self.config.effective_max_resource_size()
            && metadata.len() > max
        {
            warn!(
                id = %item.id,
                size = metadata.len(),
                max,
                "resource is larger than the configured maximum"
            );
        }

        let service = self.encryption()?;
        let (upload_path, prepared) =
            e2ee::full_path_for_sync_upload(item, &local_path, service.as_deref()).await?;
        *item = prepared;

        let result = self
            .api_call(self.api.put_file(&paths::resource_path(&item.id), &upload_path))
            .await;
        if upload_path != local_path
            && let Err(e) = tokio::fs::remove_file(&upload_path).await
        {
            debug!("could not remove {}: {e}", upload_path.display());
        }
        result
    }

    /// Updates an item if the remote has not changed since `last_sync`.
    pub async fn update_item(&self, item: Item, last_sync: i64) -> SyncResult<UpdateItemOutput> {
        self.ensure_verified().await?;
        let _operation = self.begin_operation("updateItem", 1);

        let remote = self
            .fetch_item(&GetItemOptions::by_id(&item.id).unserialized())
            .await?
            .and_then(GetItemOutput::into_item)
            .ok_or_else(|| SyncError::ItemNotFound(item.id.clone()))?;

        if remote.updated_time > last_sync {
            return Ok(UpdateItemOutput::refused(
                UpdateStatus::Conflicted,
                "Both local and remote has been changed since last sync, a conflict may have occured, please resolve it first and provide a new timestamp.",
                Some(remote),
            ));
        }
        if remote.updated_time < last_sync {
            return Ok(UpdateItemOutput::refused(
                UpdateStatus::InaccurateTimestamp,
                "Remote item hasn't synced initially with this client, or timestamp is incorrect, please pull changes, resolve, and provide a new timestamp",
                None,
            ));
        }

        info!(id = %item.id, "no remote changes since last sync, updating");
        let output = self
            .with_sync_lock(|| self.update_item_locked(&item, remote))
            .await?;
        self.record_progress(false);
        Ok(output)
    }

    async fn update_item_locked(&self, item: &Item, remote: Item) -> SyncResult<UpdateItemOutput> {
        let mut new_item = remote.clone();
        for field in &self.config.updatable_fields {
            if let Some(value) = item.field(field) {
                new_item.set_field(field, value);
            }
        }
        // Strictly increasing even if the local clock is behind.
        let updated_time = unix_ms().max(remote.updated_time + 1);
        new_item.updated_time = updated_time;
        new_item.user_updated_time = updated_time;

        if item.update_blob && new_item.is_resource() {
            new_item.local_blob_path = item.local_blob_path.clone();
            new_item.encryption_blob_encrypted = false;
            self.upload_blob(&mut new_item).await?;
        }

        let content = self.serialize_for_sync(&new_item)?;
        self.api_call(self.api.put(&paths::item_path(&new_item.id), content.as_bytes()))
            .await?;

        Ok(UpdateItemOutput {
            status: UpdateStatus::Succeeded,
            message: "Item updated successfully, please save newItem.updated_time for future sync"
                .to_string(),
            remote_item: None,
            new_sync_time: Some(updated_time),
            new_item: Some(new_item),
            old_item: Some(remote),
        })
    }

    /// Deletes items, and the blobs of resources.
    ///
    /// Accepts ids, items, or [`DeleteItem`]s.
    pub async fn delete_items<I>(&self, items: I) -> SyncResult<Vec<DeleteItemOutput>>
    where
        I: IntoIterator,
        I::Item: Into<DeleteItem>,
    {
        let items: Vec<DeleteItem> = items.into_iter().map(Into::into).collect();
        self.ensure_verified().await?;
        let _operation = self.begin_operation("deleteItems", items.len());
        self.with_sync_lock(|| self.delete_items_locked(items)).await
    }

    async fn delete_items_locked(&self, items: Vec<DeleteItem>) -> SyncResult<Vec<DeleteItemOutput>> {
        let mut report = Vec::with_capacity(items.len());
        for item in items {
            if self.check_batch()? {
                info!("delete cancelled, returning partial result");
                break;
            }
            let status = self.delete_one(&item).await;
            let (status, error) = match status {
                Ok(status) => (status, None),
                Err(e) if e.is_contention() => return Err(e),
                Err(SyncError::Driver(DriverError::ReadOnly(path))) => {
                    (DeleteStatus::ReadOnly, Some(format!("read-only: {path}")))
                }
                Err(e) => (DeleteStatus::Failed, Some(e.to_string())),
            };
            if status != DeleteStatus::Succeeded {
                warn!(id = %item.id, status = status.message(), "could not delete item");
            }
            self.record_progress(status != DeleteStatus::Succeeded);
            report.push(DeleteItemOutput { item, status, error });
        }
        Ok(report)
    }

    async fn delete_one(&self, item: &DeleteItem) -> SyncResult<DeleteStatus> {
        let id = item.id.as_str();
        let path = paths::item_path(id);
        let Some(content) = self.api_call(self.api.get(&path)).await? else {
            return Ok(DeleteStatus::ItemNotFound);
        };
        // The type stays in clear text in encrypted envelopes.
        let text = String::from_utf8_lossy(&content);
        let is_resource = item.item_type == Some(ItemType::Resource)
            || self.codec.unserialize(&text)?.is_resource();

        self.api_call(self.api.delete(&path)).await?;
        if is_resource {
            self.api_call(self.api.delete(&paths::resource_path(id))).await?;
        }
        debug!(%id, "deleted remote item");
        Ok(DeleteStatus::Succeeded)
    }
}
