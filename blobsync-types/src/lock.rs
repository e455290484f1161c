//! Advisory lock records.
//!
//! A lock is a file under `locks/` whose name encodes everything needed to
//! reconstruct it: `<type>_<clientType>_<clientId>.json`, with numeric type
//! codes. The content is ignored; `updated_time` comes from the file's stat.

use crate::ids::ClientId;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LockType {
    /// Shared lock held while writing items.
    Sync,
    /// Lock held while changing the protocol (migration, sync info).
    Exclusive,
}

/// Kind of client holding a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum LockClientType {
    Desktop,
    Mobile,
    Cli,
}

impl LockType {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            LockType::Sync => 1,
            LockType::Exclusive => 2,
        }
    }
}

impl LockClientType {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            LockClientType::Desktop => 1,
            LockClientType::Mobile => 2,
            LockClientType::Cli => 3,
        }
    }
}

impl From<LockType> for u8 {
    fn from(t: LockType) -> Self {
        t.code()
    }
}

impl TryFrom<u8> for LockType {
    type Error = crate::Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(LockType::Sync),
            2 => Ok(LockType::Exclusive),
            other => Err(crate::Error::InvalidLockName(format!("unknown lock type {other}"))),
        }
    }
}

impl From<LockClientType> for u8 {
    fn from(t: LockClientType) -> Self {
        t.code()
    }
}

impl TryFrom<u8> for LockClientType {
    type Error = crate::Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(LockClientType::Desktop),
            2 => Ok(LockClientType::Mobile),
            3 => Ok(LockClientType::Cli),
            other => Err(crate::Error::InvalidLockName(format!("unknown client type {other}"))),
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockType::Sync => f.write_str("sync"),
            LockType::Exclusive => f.write_str("exclusive"),
        }
    }
}

impl fmt::Display for LockClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockClientType::Desktop => f.write_str("desktop"),
            LockClientType::Mobile => f.write_str("mobile"),
            LockClientType::Cli => f.write_str("cli"),
        }
    }
}

/// A lock as seen on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Driver-assigned id, only set by drivers with built-in locks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub lock_type: LockType,
    pub client_type: LockClientType,
    pub client_id: ClientId,
    /// Last refresh time, in remote milliseconds.
    pub updated_time: i64,
}

impl Lock {
    #[must_use]
    pub fn new(
        lock_type: LockType,
        client_type: LockClientType,
        client_id: ClientId,
        updated_time: i64,
    ) -> Self {
        Self {
            id: None,
            lock_type,
            client_type,
            client_id,
            updated_time,
        }
    }

    /// File name of the lock, without directory.
    #[must_use]
    pub fn file_name(lock_type: LockType, client_type: LockClientType, client_id: &ClientId) -> String {
        format!("{}_{}_{}.json", lock_type.code(), client_type.code(), client_id)
    }

    /// Path of the lock file relative to the sync root.
    #[must_use]
    pub fn path_for(lock_type: LockType, client_type: LockClientType, client_id: &ClientId) -> String {
        paths::join(paths::LOCK_DIR, &Self::file_name(lock_type, client_type, client_id))
    }

    /// Path of this lock's file relative to the sync root.
    #[must_use]
    pub fn path(&self) -> String {
        Self::path_for(self.lock_type, self.client_type, &self.client_id)
    }

    /// Reconstructs a lock from its file name (any leading directory is
    /// ignored) and the file's modification time.
    pub fn from_file_name(name: &str, updated_time: i64) -> crate::Result<Self> {
        let invalid = || crate::Error::InvalidLockName(name.to_string());
        let stem = paths::basename(name).strip_suffix(".json").ok_or_else(invalid)?;

        let mut parts = stem.splitn(3, '_');
        let (Some(ty), Some(client_ty), Some(client_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if ty.len() != 1 || client_ty.len() != 1 || !ClientId::is_valid(client_id) {
            return Err(invalid());
        }
        let ty: u8 = ty.parse().map_err(|_| invalid())?;
        let client_ty: u8 = client_ty.parse().map_err(|_| invalid())?;

        Ok(Self::new(
            LockType::try_from(ty)?,
            LockClientType::try_from(client_ty)?,
            ClientId::from(client_id),
            updated_time,
        ))
    }

    /// True if the lock belongs to the given client.
    #[must_use]
    pub fn is_owned_by(&self, client_type: LockClientType, client_id: &ClientId) -> bool {
        self.client_type == client_type && &self.client_id == client_id
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lock of {} client {} (updated {})",
            self.lock_type, self.client_type, self.client_id, self.updated_time
        )
    }
}
