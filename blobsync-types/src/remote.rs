//! Remote listing types: stats, paginated lists and the delta cursor.

use crate::item::ItemType;
use crate::paths;
use serde::{Deserialize, Serialize};

/// A driver-level stat result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStat {
    /// Path relative to the listed directory (or the sync root for `stat`).
    pub path: String,
    /// Modification time in remote milliseconds.
    pub updated_time: i64,
    #[serde(default)]
    pub is_dir: bool,
}

impl ItemStat {
    #[must_use]
    pub fn file(path: impl Into<String>, updated_time: i64) -> Self {
        Self {
            path: path.into(),
            updated_time,
            is_dir: false,
        }
    }

    #[must_use]
    pub fn dir(path: impl Into<String>, updated_time: i64) -> Self {
        Self {
            path: path.into(),
            updated_time,
            is_dir: true,
        }
    }
}

/// A remote entry as reported by `stat` or `delta`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Item id for `<id>.md` paths, the path itself otherwise.
    pub id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    pub updated_time: i64,
    /// Item-level `updated_time` when the driver knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jop_updated_time: Option<i64>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl RemoteItem {
    /// Builds a remote item from a stat result.
    #[must_use]
    pub fn from_stat(stat: &ItemStat) -> Self {
        Self {
            id: id_for_path(&stat.path),
            path: stat.path.clone(),
            item_type: None,
            updated_time: stat.updated_time,
            jop_updated_time: None,
            is_deleted: false,
        }
    }

    /// Builds a tombstone for an item that disappeared from the remote.
    #[must_use]
    pub fn deleted(id: &str) -> Self {
        Self {
            id: id.to_string(),
            path: paths::item_path(id),
            item_type: None,
            updated_time: 0,
            jop_updated_time: None,
            is_deleted: true,
        }
    }
}

fn id_for_path(path: &str) -> String {
    paths::path_to_id(path).unwrap_or(path).to_string()
}

/// One page of a listing or delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    pub has_more: bool,
    /// Cursor to pass back for the next page (delta only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<DeltaContext>,
}

impl<T> PaginatedList<T> {
    /// A complete, single-page listing.
    #[must_use]
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
            context: None,
        }
    }
}

/// Opaque delta cursor, persisted by the caller between calls.
///
/// `files_at_timestamp` lists every path whose `updated_time` equals
/// `timestamp` that has already been reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaContext {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub files_at_timestamp: Vec<String>,
    /// Stats of the current sweep, sorted by `updated_time`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_cache: Option<Vec<ItemStat>>,
    /// Sorted item ids of the current sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_ids_cache: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted_items_processed: bool,
}

impl DeltaContext {
    /// A fresh cursor starting at `timestamp`.
    #[must_use]
    pub fn since(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }
}

/// One entry of a batched upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPutItem {
    pub path: String,
    pub body: Vec<u8>,
}
