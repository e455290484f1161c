//! Core type definitions for blobsync.
//!
//! This crate defines the types shared by drivers, the lock manager and the
//! synchronizer:
//! - Item and client identifiers
//! - Millisecond timestamps and their ISO-8601 wire form
//! - Application items and the codec that turns them into remote files
//! - Remote stats, delta cursors and locks
//! - The well-known remote path layout

pub mod codec;
mod ids;
mod item;
mod lock;
pub mod paths;
mod remote;
pub mod timestamp;

pub use codec::{ItemCodec, MarkdownCodec};
pub use ids::{create_uuid, ClientId};
pub use item::{Item, ItemType};
pub use lock::{Lock, LockClientType, LockType};
pub use remote::{DeltaContext, ItemStat, MultiPutItem, PaginatedList, RemoteItem};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid item type: {0}")]
    InvalidItemType(String),

    #[error("invalid lock file name: {0}")]
    InvalidLockName(String),

    #[error("cannot unserialize item: {0}")]
    Unserialize(String),
}
