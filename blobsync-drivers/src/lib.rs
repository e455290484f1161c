//! Storage drivers for blobsync.
//!
//! A driver exposes one physical backend as a flat tree of files addressed by
//! `/`-separated relative paths. Drivers know nothing about items, locks or
//! encryption; that is layered on top by `blobsync-sync`.
//!
//! Provided drivers:
//! - [`MemoryDriver`]: in-process, for tests and ephemeral targets
//! - [`LocalDriver`]: a directory on the local filesystem

mod driver;
mod error;
mod local;
mod memory;

pub use driver::StorageDriver;
pub use error::{DriverError, DriverResult};
pub use local::LocalDriver;
pub use memory::MemoryDriver;
