//! Identifier types used throughout blobsync.
//!
//! Item ids are 32-character lowercase hex strings (a UUID v4 without
//! dashes). Callers may also choose their own ids; the remote layout only
//! requires that an id is a valid file name stem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Creates a new 32-hex item id.
#[must_use]
pub fn create_uuid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Identifier of a sync client (one per synchronizer instance).
///
/// Encoded verbatim in lock file names, so it must not contain `_` or `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Creates a new random client id.
    #[must_use]
    pub fn new() -> Self {
        Self(create_uuid())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id can be embedded in a lock file name.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl FromStr for ClientId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_valid(s) {
            return Err(crate::Error::InvalidLockName(format!("invalid client id: {s}")));
        }
        Ok(Self(s.to_string()))
    }
}
