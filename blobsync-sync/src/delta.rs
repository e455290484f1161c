//! Timestamp-based change detection.
//!
//! For targets without a native change feed, the delta is computed from a
//! directory listing. Entries are walked in `updated_time` order and
//! everything newer than the cursor is reported. Several files can share a
//! timestamp, so the cursor also remembers which paths at exactly
//! `timestamp` were already reported.
//!
//! The listing is fetched once per sweep and carried in the context, so
//! every page of a sweep sees the same snapshot.

use crate::config::DeltaOptions;
use crate::error::{SyncError, SyncResult};
use blobsync_types::timestamp::unix_ms;
use blobsync_types::{paths, ItemStat, PaginatedList, RemoteItem};
use std::cmp::Ordering;
use std::future::Future;
use tracing::{debug, info, warn};

/// Share of known ids that may be reported deleted before the fail-safe trips.
const FAIL_SAFE_RATIO: f64 = 0.9;

/// Computes one page of changes under `path`.
///
/// `stat_fn` lists the directory; it is only called at the start of a
/// sweep.
pub async fn basic_delta<F, Fut>(
    path: &str,
    stat_fn: F,
    options: &DeltaOptions,
) -> SyncResult<PaginatedList<RemoteItem>>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = SyncResult<Vec<ItemStat>>>,
{
    let output_limit = options.output_limit.max(1);
    let mut context = options.context.clone().unwrap_or_default();

    if context.timestamp > unix_ms() {
        warn!(
            timestamp = context.timestamp,
            "delta context timestamp is in the future, nothing newer will be found"
        );
    }

    if context.stats_cache.is_none() {
        let mut stats = stat_fn(path.to_string()).await?;
        stats.sort_by_key(|stat| stat.updated_time);
        let mut ids: Vec<String> = stats
            .iter()
            .filter_map(|stat| paths::path_to_id(&stat.path).map(str::to_string))
            .collect();
        ids.sort();
        context.stat_ids_cache = Some(ids);
        context.stats_cache = Some(stats);
    }

    let mut output = Vec::new();
    let mut report = (0usize, 0usize, 0usize); // (older, newer, equal)
    let mut new_files_at_timestamp = context.files_at_timestamp.clone();
    let mut max_timestamp = context.timestamp;

    for stat in context.stats_cache.as_deref().unwrap_or_default() {
        if stat.is_dir {
            continue;
        }
        match stat.updated_time.cmp(&context.timestamp) {
            Ordering::Less => {
                report.0 += 1;
                continue;
            }
            Ordering::Equal => {
                report.2 += 1;
                if context.files_at_timestamp.contains(&stat.path) {
                    continue;
                }
            }
            Ordering::Greater => report.1 += 1,
        }

        if stat.updated_time > max_timestamp {
            max_timestamp = stat.updated_time;
            new_files_at_timestamp.clear();
        }
        new_files_at_timestamp.push(stat.path.clone());
        output.push(RemoteItem::from_stat(stat));

        if output.len() >= output_limit {
            break;
        }
    }

    debug!(
        older = report.0,
        newer = report.1,
        equal = report.2,
        "delta report"
    );

    if options.track_deleted_items && !context.deleted_items_processed {
        let stat_ids = context.stat_ids_cache.as_deref().unwrap_or_default();
        let deleted: Vec<&String> = options
            .all_item_ids
            .iter()
            .filter(|id| stat_ids.binary_search(*id).is_err())
            .collect();

        if options.wipe_out_fail_safe && !options.all_item_ids.is_empty() {
            let ratio = deleted.len() as f64 / options.all_item_ids.len() as f64;
            if ratio >= FAIL_SAFE_RATIO {
                warn!(
                    deleted = deleted.len(),
                    known = options.all_item_ids.len(),
                    "delta would delete most items, aborting"
                );
                return Err(SyncError::FailSafe);
            }
        }

        if !deleted.is_empty() {
            info!(count = deleted.len(), "remote items deleted since last sweep");
        }
        output.extend(deleted.into_iter().map(|id| RemoteItem::deleted(id)));
        context.deleted_items_processed = true;
    }

    let has_more = output.len() >= output_limit;
    context.timestamp = max_timestamp;
    context.files_at_timestamp = new_files_at_timestamp;
    if !has_more {
        context.stats_cache = None;
        context.stat_ids_cache = None;
        context.deleted_items_processed = false;
    }

    Ok(PaginatedList {
        items: output,
        has_more,
        context: Some(context),
    })
}
