//! In-memory storage driver.
//!
//! Keeps every file in a sorted map keyed by path. Directories exist either
//! explicitly (`mkdir`) or implicitly as the parent of a stored file.
//! Suitable for tests and ephemeral sync targets.

use crate::driver::StorageDriver;
use crate::error::{DriverError, DriverResult};
use async_trait::async_trait;
use blobsync_types::timestamp::unix_ms;
use blobsync_types::{ItemStat, PaginatedList};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    content: Vec<u8>,
    updated_time: i64,
    is_dir: bool,
}

/// An in-memory storage driver.
///
/// Thread-safe; share it behind an `Arc` to simulate several clients
/// talking to the same remote.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    entries: RwLock<BTreeMap<String, Entry>>,
    /// Added to the local clock when stamping files.
    clock_offset: AtomicI64,
    /// Number of upcoming calls that fail with a storage error.
    pending_failures: AtomicU32,
    read_only: RwLock<HashSet<String>>,
    request_repeat_count: u32,
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn child_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many extra attempts the file layer should make on failure.
    #[must_use]
    pub fn with_request_repeat_count(mut self, count: u32) -> Self {
        self.request_repeat_count = count;
        self
    }

    /// Simulates a remote clock that is `offset_ms` ahead of the local one.
    pub fn set_clock_offset(&self, offset_ms: i64) {
        self.clock_offset.store(offset_ms, Ordering::SeqCst);
    }

    /// Makes the next `count` driver calls fail.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Overrides the modification time of a stored file.
    pub fn set_updated_time(&self, path: &str, updated_time: i64) -> bool {
        match self.entries.write().get_mut(normalize(path)) {
            Some(entry) => {
                entry.updated_time = updated_time;
                true
            }
            None => false,
        }
    }

    /// Makes `path` refuse deletion.
    pub fn set_read_only(&self, path: &str, read_only: bool) {
        let mut paths = self.read_only.write();
        if read_only {
            paths.insert(normalize(path).to_string());
        } else {
            paths.remove(normalize(path));
        }
    }

    /// All stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn now(&self) -> i64 {
        unix_ms() + self.clock_offset.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> DriverResult<()> {
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DriverError::Storage("injected failure".to_string()));
        }
        Ok(())
    }

    fn remove_tree(entries: &mut BTreeMap<String, Entry>, path: &str) {
        let prefix = child_prefix(path);
        entries.retain(|key, _| key != path && !(key.starts_with(&prefix) && !prefix.is_empty()));
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn stat(&self, path: &str) -> DriverResult<Option<ItemStat>> {
        self.check_failure()?;
        let path = normalize(path);
        let entries = self.entries.read();

        if let Some(entry) = entries.get(path) {
            return Ok(Some(ItemStat {
                path: path.to_string(),
                updated_time: entry.updated_time,
                is_dir: entry.is_dir,
            }));
        }

        let prefix = child_prefix(path);
        let newest_child = entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(_, entry)| entry.updated_time)
            .max();
        Ok(newest_child.map(|time| ItemStat::dir(path, time)))
    }

    async fn list(&self, path: &str) -> DriverResult<PaginatedList<ItemStat>> {
        self.check_failure()?;
        let prefix = child_prefix(normalize(path));
        let entries = self.entries.read();

        let mut children: BTreeMap<String, ItemStat> = BTreeMap::new();
        for (key, entry) in entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
        {
            let rest = &key[prefix.len()..];
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let stat = children
                        .entry(dir.to_string())
                        .or_insert_with(|| ItemStat::dir(dir, entry.updated_time));
                    stat.updated_time = stat.updated_time.max(entry.updated_time);
                }
                None if !rest.is_empty() => {
                    children.insert(
                        rest.to_string(),
                        ItemStat {
                            path: rest.to_string(),
                            updated_time: entry.updated_time,
                            is_dir: entry.is_dir,
                        },
                    );
                }
                None => {}
            }
        }

        Ok(PaginatedList::complete(children.into_values().collect()))
    }

    async fn get(&self, path: &str) -> DriverResult<Option<Vec<u8>>> {
        self.check_failure()?;
        Ok(self
            .entries
            .read()
            .get(normalize(path))
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.content.clone()))
    }

    async fn put(&self, path: &str, content: &[u8]) -> DriverResult<()> {
        self.check_failure()?;
        let path = normalize(path);
        trace!(path, bytes = content.len(), "memory put");
        let entry = Entry {
            content: content.to_vec(),
            updated_time: self.now(),
            is_dir: false,
        };
        self.entries.write().insert(path.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, path: &str) -> DriverResult<()> {
        self.check_failure()?;
        let path = normalize(path);
        if self.read_only.read().contains(path) {
            return Err(DriverError::ReadOnly(path.to_string()));
        }
        Self::remove_tree(&mut self.entries.write(), path);
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> DriverResult<()> {
        self.check_failure()?;
        let path = normalize(path);
        if path.is_empty() {
            return Ok(());
        }
        let now = self.now();
        self.entries.write().entry(path.to_string()).or_insert(Entry {
            content: Vec::new(),
            updated_time: now,
            is_dir: true,
        });
        Ok(())
    }

    async fn move_item(&self, from: &str, to: &str) -> DriverResult<()> {
        self.check_failure()?;
        let (from, to) = (normalize(from), normalize(to));
        let prefix = child_prefix(from);
        let mut entries = self.entries.write();

        let moved: Vec<(String, Entry)> = entries
            .iter()
            .filter(|(key, _)| key.as_str() == from || key.starts_with(&prefix))
            .map(|(key, entry)| (format!("{to}{}", &key[from.len()..]), entry.clone()))
            .collect();
        if moved.is_empty() {
            return Err(DriverError::Storage(format!("cannot move missing path: {from}")));
        }
        Self::remove_tree(&mut entries, from);
        entries.extend(moved);
        Ok(())
    }

    async fn format(&self) -> DriverResult<()> {
        self.check_failure()?;
        self.entries.write().clear();
        Ok(())
    }

    async fn clear_root(&self, base_path: &str) -> DriverResult<()> {
        self.check_failure()?;
        let base = normalize(base_path);
        let mut entries = self.entries.write();
        if base.is_empty() {
            entries.clear();
        } else {
            let prefix = child_prefix(base);
            entries.retain(|key, _| !key.starts_with(&prefix));
        }
        Ok(())
    }

    fn request_repeat_count(&self) -> u32 {
        self.request_repeat_count
    }
}
