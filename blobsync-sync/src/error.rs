//! Error types for the sync layer.

use blobsync_crypto::CryptoError;
use blobsync_drivers::DriverError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage driver failure (after the repeat wrapper gave up).
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Item codec or model failure.
    #[error(transparent)]
    Types(#[from] blobsync_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid arguments from the caller.
    #[error("{0}")]
    InvalidInput(String),

    /// A local file the operation needs does not exist.
    #[error("{0}")]
    FileNotFound(String),

    /// The driver lacks a capability.
    #[error("{0}")]
    Unsupported(String),

    /// Another client holds an Exclusive lock.
    #[error("{0}")]
    HasExclusiveLock(String),

    /// At least one client holds a Sync lock.
    #[error("{0}")]
    HasSyncLock(String),

    /// A lock being refreshed disappeared or expired.
    #[error("{0}")]
    LockExpired(String),

    /// A remote call failed while the lock state was invalid.
    #[error("{0}")]
    LockError(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Remote item exists, can't create.")]
    RemoteItemExists(String),

    /// The same path was uploaded twice in one batch.
    #[error(
        "Processing a path that has already been done: {0}. sync_time was not updated? Remote item has an updated_time in the future?"
    )]
    ProcessingPathTwice(String),

    /// The delta would report most known items as deleted.
    #[error(
        "More than 90% of the notes are going to be deleted. This is likely a configuration error or bug. Sync has been aborted to prevent data loss."
    )]
    FailSafe,

    #[error("No remote sync info file found. Please initialize sync target with client first.")]
    NotInitialized,

    #[error("Sync API supports sync version 3, your version is {0}, which is not supported.")]
    UnsupportedVersion(u32),

    #[error("In order to synchronise, please upgrade your application to version {required}+")]
    MustUpgradeApp { required: String, current: String },

    /// Local and remote encryption settings disagree.
    #[error("{0}")]
    E2eeMismatch(String),

    #[error("Trying to encrypt item that is already encrypted: {0}")]
    AlreadyEncrypted(String),

    #[error("Trying to access encrypted resource but encryption is currently disabled")]
    EncryptionDisabled,

    /// Operation timed out.
    #[error("{0}")]
    Timeout(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Driver(_) => "driverError",
            Self::Crypto(_) => "cryptoError",
            Self::Types(_) => "invalidItem",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::InvalidInput(_) => "invalidInput",
            Self::FileNotFound(_) => "fileNotFound",
            Self::Unsupported(_) => "unsupported",
            Self::HasExclusiveLock(_) => "hasExclusiveLock",
            Self::HasSyncLock(_) => "hasSyncLock",
            Self::LockExpired(_) => "lockExpired",
            Self::LockError(_) => "lockError",
            Self::ItemNotFound(_) => "itemNotFound",
            Self::RemoteItemExists(_) => "remoteItemExists",
            Self::ProcessingPathTwice(_) => "processingPathTwice",
            Self::FailSafe => "failSafe",
            Self::NotInitialized => "notInitialized",
            Self::UnsupportedVersion(_) => "unsupportedVersion",
            Self::MustUpgradeApp { .. } => "mustUpgradeApp",
            Self::E2eeMismatch(_) => "e2eeMismatch",
            Self::AlreadyEncrypted(_) => "alreadyEncrypted",
            Self::EncryptionDisabled => "encryptionDisabled",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Another client holds the target, or our own lock is gone.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::HasExclusiveLock(_) | Self::HasSyncLock(_) | Self::LockExpired(_) | Self::LockError(_)
        )
    }

    /// The remote or the batch is in a state that must not be written over.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            Self::ProcessingPathTwice(_)
                | Self::FailSafe
                | Self::RemoteItemExists(_)
                | Self::AlreadyEncrypted(_)
                | Self::FileNotFound(_)
        )
    }

    /// The sync target and this client disagree on the protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::UnsupportedVersion(_)
                | Self::MustUpgradeApp { .. }
                | Self::E2eeMismatch(_)
                | Self::EncryptionDisabled
        )
    }

    /// Retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Driver(e) => !e.is_permanent(),
            Self::Io(_) | Self::Timeout(_) => true,
            _ => self.is_contention(),
        }
    }
}
