//! Driver error types.

use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by storage drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A local source file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("{driver} driver does not support {operation}")]
    Unsupported {
        driver: &'static str,
        operation: &'static str,
    },

    /// The remote path cannot be modified.
    #[error("read-only: {0}")]
    ReadOnly(String),

    /// Backend-specific failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DriverError {
    pub(crate) fn unsupported(driver: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { driver, operation }
    }

    /// Returns true if retrying the same call cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::Unsupported { .. } | Self::ReadOnly(_)
        )
    }
}
