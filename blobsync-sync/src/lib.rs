//! File-based sync coordination for blobsync.
//!
//! Clients share a sync target (any [`StorageDriver`]) and coordinate
//! through plain files on it:
//!
//! - **Locks**: `locks/<type>_<client type>_<client id>.json` files with a
//!   time-to-live, refreshed while held
//! - **Sync info**: `info.json`, the protocol version and encryption
//!   settings of the target
//! - **Items**: `<id>.md` files, resource blobs under `.resource/<id>`
//!
//! # Architecture
//!
//! - [`FileApi`]: path resolution, retries and remote clock estimation on
//!   top of a driver
//! - [`basic_delta`]: change detection by stat comparison for drivers
//!   without a native delta
//! - [`LockHandler`]: Sync/Exclusive lock protocol and auto-refresh
//! - [`MigrationHandler`]: target initialisation and sync info publication
//! - [`Synchronizer`]: item create/read/update/delete with optimistic
//!   concurrency and end-to-end encryption
//!
//! # Example
//!
//! ```no_run
//! use blobsync_drivers::MemoryDriver;
//! use blobsync_sync::{Synchronizer, SynchronizerConfig, SYNC_TARGET_VERSION};
//! use blobsync_types::Item;
//! use std::sync::Arc;
//!
//! # async fn run() -> blobsync_sync::SyncResult<()> {
//! let sync = Synchronizer::new(Arc::new(MemoryDriver::new()), SynchronizerConfig::default());
//! sync.migration_handler().init_sync_info(SYNC_TARGET_VERSION).await?;
//! let created = sync.create_items(vec![Item::note("", "Title", "Body")]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`StorageDriver`]: blobsync_drivers::StorageDriver

pub mod config;
pub mod delta;
pub mod e2ee;
mod error;
pub mod file_api;
pub mod locks;
pub mod migration;
pub mod sync_info;
pub mod synchronizer;
pub mod task_queue;

pub use config::{
    AcquireLockOptions, DeltaOptions, FileApiOptions, LockHandlerOptions, SynchronizerConfig,
};
pub use delta::basic_delta;
pub use e2ee::E2eeInfo;
pub use error::{SyncError, SyncResult};
pub use file_api::{FileApi, ListOptions};
pub use locks::{active_lock, LockHandler, LockRefreshMonitor, RefreshFailure};
pub use migration::MigrationHandler;
pub use sync_info::{compare_versions, SyncInfo, SyncInfoValue, SYNC_TARGET_VERSION};
pub use synchronizer::{
    CreateItemsOutput, DeleteItem, DeleteItemOutput, DeleteStatus, FailedItem, GetItemOptions,
    GetItemOutput, GetItemsMetadataOptions, GetItemsOptions, ProgressReport, SyncState,
    Synchronizer, UpdateItemOutput, UpdateStatus, VerifyOutcome, VerifyStatus,
};
pub use task_queue::TaskQueue;
