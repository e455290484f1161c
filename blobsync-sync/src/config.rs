//! Configuration structs.
//!
//! All durations are milliseconds, like the rest of the crate's timestamps.

use blobsync_types::{ClientId, DeltaContext, LockClientType};
use serde::{Deserialize, Serialize};

/// Default lock time-to-live (3 minutes).
pub const DEFAULT_LOCK_TTL_MS: u64 = 3 * 60 * 1000;

/// Default auto-refresh period (1 minute).
pub const DEFAULT_AUTO_REFRESH_INTERVAL_MS: u64 = 60 * 1000;

/// Default page size of a delta.
pub const DEFAULT_DELTA_LIMIT: usize = 50;

/// Largest batch accepted by `create_items`.
pub const MAX_CREATE_BATCH: usize = 10;

/// Resource size above which mobile clients warn.
pub const MOBILE_MAX_RESOURCE_SIZE: u64 = 100 * 1024 * 1024;

/// File access layer options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileApiOptions {
    /// Directory on the remote every path is resolved under.
    #[serde(default)]
    pub base_dir: String,
    /// Extra attempts after a failed call. Falls back to the driver's value.
    #[serde(default)]
    pub request_repeat_count: Option<u32>,
}

/// Lock manager options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandlerOptions {
    /// A lock not refreshed for this long is expired.
    pub lock_ttl_ms: u64,
    /// Period of the auto-refresh task.
    pub auto_refresh_interval_ms: u64,
    /// Poll period while waiting for a contended lock.
    pub acquire_wait_interval_ms: u64,
}

impl Default for LockHandlerOptions {
    fn default() -> Self {
        Self {
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            auto_refresh_interval_ms: DEFAULT_AUTO_REFRESH_INTERVAL_MS,
            acquire_wait_interval_ms: 1000,
        }
    }
}

/// Per-call lock acquisition options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquireLockOptions {
    /// Before taking an Exclusive lock, drop our own Sync lock.
    pub clear_existing_sync_locks_from_the_same_client: bool,
    /// 0 fails immediately on contention; otherwise keep polling this long.
    pub timeout_ms: u64,
}

/// Options of a delta request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaOptions {
    /// Cursor returned by the previous page.
    pub context: Option<DeltaContext>,
    /// Ids the caller knows about, for deleted-item detection.
    pub all_item_ids: Vec<String>,
    /// Report known ids missing from the remote as deleted.
    pub track_deleted_items: bool,
    /// Refuse to report 90% or more of the known ids as deleted.
    pub wipe_out_fail_safe: bool,
    pub output_limit: usize,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            context: None,
            all_item_ids: Vec::new(),
            track_deleted_items: false,
            wipe_out_fail_safe: true,
            output_limit: DEFAULT_DELTA_LIMIT,
        }
    }
}

/// Synchronizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizerConfig {
    pub client_type: LockClientType,
    pub client_id: ClientId,
    /// Compared against `app_min_version` of the sync info.
    pub app_version: String,
    /// Resources above this size log a warning. `None` picks the client default.
    #[serde(default)]
    pub max_resource_size: Option<u64>,
    /// Fields `update_item` copies from the caller's item.
    pub updatable_fields: Vec<String>,
    /// Parallel downloads in `get_items`.
    pub download_concurrency: usize,
    #[serde(default)]
    pub lock: LockHandlerOptions,
    #[serde(default)]
    pub file_api: FileApiOptions,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            client_type: LockClientType::Desktop,
            client_id: ClientId::new(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            max_resource_size: None,
            updatable_fields: ["title", "body", "ocr_details", "ocr_text", "ocr_status", "ocr_error"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            download_concurrency: 5,
            lock: LockHandlerOptions::default(),
            file_api: FileApiOptions::default(),
        }
    }
}

impl SynchronizerConfig {
    /// Size threshold actually applied to resources.
    pub fn effective_max_resource_size(&self) -> Option<u64> {
        self.max_resource_size.or(match self.client_type {
            LockClientType::Mobile => Some(MOBILE_MAX_RESOURCE_SIZE),
            _ => None,
        })
    }
}
