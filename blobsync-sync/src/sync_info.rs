//! The sync info document (`info.json`).
//!
//! Records the protocol version and the encryption configuration of the
//! target. Each mutable field carries its own `updatedTime`, so two copies
//! can be merged field by field with last-writer-wins.

use crate::error::{SyncError, SyncResult};
use crate::file_api::FileApi;
use blobsync_crypto::{MasterKeyEntity, PublicPrivateKeyPair};
use blobsync_types::paths;
use blobsync_types::timestamp::unix_ms;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::warn;

/// Version written by this implementation.
pub const SYNC_TARGET_VERSION: u32 = 3;

const DEFAULT_APP_MIN_VERSION: &str = "0.0.0";

fn default_app_min_version() -> String {
    DEFAULT_APP_MIN_VERSION.to_string()
}

/// A value stamped with the time it was last changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfoValue<T> {
    pub value: T,
    #[serde(default)]
    pub updated_time: i64,
}

/// Sync target metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    e2ee: SyncInfoValue<bool>,
    #[serde(default)]
    active_master_key_id: SyncInfoValue<String>,
    #[serde(default)]
    master_keys: Vec<MasterKeyEntity>,
    #[serde(default)]
    ppk: SyncInfoValue<Option<PublicPrivateKeyPair>>,
    #[serde(default = "default_app_min_version")]
    app_min_version: String,
}

impl Default for SyncInfo {
    fn default() -> Self {
        Self {
            version: 0,
            e2ee: SyncInfoValue::default(),
            active_master_key_id: SyncInfoValue::default(),
            master_keys: Vec::new(),
            ppk: SyncInfoValue::default(),
            app_min_version: default_app_min_version(),
        }
    }
}

impl SyncInfo {
    /// An empty document of the given version.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Parses `info.json`.
    pub fn parse(text: &str) -> SyncResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("version").and_then(serde_json::Value::as_u64).unwrap_or(0) == 0 {
            return Err(SyncError::InvalidInput(
                "Missing \"version\" field in info.json".to_string(),
            ));
        }
        let mut info: Self = serde_json::from_value(value)?;
        if info.app_min_version.is_empty() {
            info.app_min_version = default_app_min_version();
        }
        info.fix();
        Ok(info)
    }

    /// Tab-indented JSON, as stored on the target.
    pub fn serialize(&self) -> SyncResult<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        Serialize::serialize(self, &mut serializer)?;
        String::from_utf8(out).map_err(|e| SyncError::InvalidInput(e.to_string()))
    }

    /// Clears an active master key id that names no known key.
    pub fn fix(&mut self) {
        let active = &self.active_master_key_id.value;
        if !active.is_empty() && self.master_key(active).is_none() {
            warn!("sync info is using a non-existent key as the active key, clearing it: {active}");
            self.active_master_key_id.value.clear();
        }
    }

    /// Copy without key material, safe to log or return to callers.
    pub fn filtered(&self) -> Self {
        Self {
            master_keys: self.master_keys.iter().map(MasterKeyEntity::redacted).collect(),
            ppk: SyncInfoValue {
                value: self.ppk.value.as_ref().map(PublicPrivateKeyPair::redacted),
                updated_time: self.ppk.updated_time,
            },
            ..self.clone()
        }
    }

    /// Merges two documents field by field. On equal timestamps `other` wins.
    pub fn merge(&self, other: &SyncInfo) -> SyncInfo {
        fn newer<'a, T>(a: &'a SyncInfoValue<T>, b: &'a SyncInfoValue<T>) -> &'a SyncInfoValue<T> {
            if a.updated_time > b.updated_time { a } else { b }
        }

        let mut master_keys = self.master_keys.clone();
        for key in &other.master_keys {
            match master_keys.iter_mut().find(|k| k.id == key.id) {
                Some(existing) if key.updated_time > existing.updated_time => *existing = key.clone(),
                Some(_) => {}
                None => master_keys.push(key.clone()),
            }
        }

        let app_min_version = match compare_versions(&self.app_min_version, &other.app_min_version) {
            Ordering::Greater => self.app_min_version.clone(),
            _ => other.app_min_version.clone(),
        };

        let mut merged = SyncInfo {
            version: self.version.max(other.version),
            e2ee: newer(&self.e2ee, &other.e2ee).clone(),
            active_master_key_id: newer(&self.active_master_key_id, &other.active_master_key_id).clone(),
            master_keys,
            ppk: newer(&self.ppk, &other.ppk).clone(),
            app_min_version,
        };
        merged.fix();
        merged
    }

    /// Fails if this client is older than the target requires.
    pub fn check_if_can_sync(&self, app_version: &str) -> SyncResult<()> {
        if compare_versions(app_version, &self.app_min_version) == Ordering::Less {
            return Err(SyncError::MustUpgradeApp {
                required: self.app_min_version.clone(),
                current: app_version.to_string(),
            });
        }
        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn e2ee(&self) -> bool {
        self.e2ee.value
    }

    pub fn set_e2ee(&mut self, enabled: bool) {
        if self.e2ee.value != enabled {
            self.e2ee = SyncInfoValue {
                value: enabled,
                updated_time: unix_ms(),
            };
        }
    }

    /// Active master key id, `None` when unset.
    pub fn active_master_key_id(&self) -> Option<&str> {
        Some(self.active_master_key_id.value.as_str()).filter(|id| !id.is_empty())
    }

    pub fn set_active_master_key_id(&mut self, id: &str) {
        if self.active_master_key_id.value != id {
            self.active_master_key_id = SyncInfoValue {
                value: id.to_string(),
                updated_time: unix_ms(),
            };
        }
    }

    pub fn master_keys(&self) -> &[MasterKeyEntity] {
        &self.master_keys
    }

    pub fn master_key(&self, id: &str) -> Option<&MasterKeyEntity> {
        self.master_keys.iter().find(|k| k.id == id)
    }

    /// Adds a master key or replaces the one with the same id.
    pub fn upsert_master_key(&mut self, key: MasterKeyEntity) {
        match self.master_keys.iter_mut().find(|k| k.id == key.id) {
            Some(existing) => *existing = key,
            None => self.master_keys.push(key),
        }
    }

    pub fn ppk(&self) -> Option<&PublicPrivateKeyPair> {
        self.ppk.value.as_ref()
    }

    pub fn set_ppk(&mut self, ppk: Option<PublicPrivateKeyPair>) {
        if self.ppk.value != ppk {
            self.ppk = SyncInfoValue {
                value: ppk,
                updated_time: unix_ms(),
            };
        }
    }

    pub fn app_min_version(&self) -> &str {
        &self.app_min_version
    }

    pub fn set_app_min_version(&mut self, version: &str) {
        self.app_min_version = version.to_string();
    }

    /// Timestamps of the mergeable fields: (e2ee, active key, ppk).
    pub fn key_timestamps(&self) -> (i64, i64, i64) {
        (
            self.e2ee.updated_time,
            self.active_master_key_id.updated_time,
            self.ppk.updated_time,
        )
    }
}

/// Compares dotted numeric versions (`1.10.0 > 1.9.3`). Missing or
/// non-numeric parts count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parts = |v: &str| -> Vec<u64> {
        v.trim_start_matches('v')
            .split(['.', '-', '+'])
            .take(3)
            .map(|p| {
                p.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    };
    let (a, b) = (parts(a), parts(b));
    (0..3)
        .map(|i| a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0)))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Reads the sync info of the target.
///
/// An empty target yields version 0; a legacy target (only
/// `.sync/version.txt`) yields version 1.
pub async fn fetch_sync_info(api: &FileApi) -> SyncResult<SyncInfo> {
    if let Some(content) = api.get(paths::INFO_FILE).await? {
        let text = String::from_utf8(content)
            .map_err(|e| SyncError::InvalidInput(format!("info.json is not valid UTF-8: {e}")))?;
        return SyncInfo::parse(&text);
    }
    if api.get(paths::LEGACY_VERSION_FILE).await?.is_some() {
        return Ok(SyncInfo::new(1));
    }
    Ok(SyncInfo::new(0))
}

pub async fn upload_sync_info(api: &FileApi, info: &SyncInfo) -> SyncResult<()> {
    api.put(paths::INFO_FILE, info.serialize()?.as_bytes()).await
}
