use blobsync_drivers::{MemoryDriver, StorageDriver};
use blobsync_sync::{DeltaOptions, FileApi, FileApiOptions, ListOptions, SyncError};
use blobsync_types::timestamp::unix_ms;
use blobsync_types::{ClientId, LockClientType, LockType, MultiPutItem};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn api_on(driver: Arc<MemoryDriver>) -> FileApi {
    FileApi::new(driver, FileApiOptions::default())
}

fn names(stats: &[blobsync_types::ItemStat]) -> Vec<&str> {
    stats.iter().map(|s| s.path.as_str()).collect()
}

// ── Paths ───────────────────────────────────────────────────────

#[tokio::test]
async fn paths_resolve_under_base_dir() {
    let driver = Arc::new(MemoryDriver::new());
    let api = FileApi::new(
        driver.clone(),
        FileApiOptions {
            base_dir: "target".to_string(),
            request_repeat_count: None,
        },
    );
    api.put("a.md", b"x").await.unwrap();

    assert_eq!(driver.paths(), vec!["target/a.md".to_string()]);
    assert_eq!(api.get("a.md").await.unwrap().unwrap(), b"x");
    let stat = api.stat("a.md").await.unwrap().unwrap();
    assert_eq!(stat.path, "a.md");
}

// ── Listing ─────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_hidden_and_non_item_entries() {
    let driver = Arc::new(MemoryDriver::new());
    let api = api_on(driver);
    api.put("a.md", b"x").await.unwrap();
    api.put("info.json", b"{}").await.unwrap();
    api.put(".resource/a", b"blob").await.unwrap();
    api.mkdir("locks").await.unwrap();

    let all = api.list("", ListOptions::default()).await.unwrap();
    assert_eq!(names(&all.items), vec!["a.md", "info.json", "locks"]);

    let hidden = api
        .list(
            "",
            ListOptions {
                include_hidden: true,
                ..ListOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(names(&hidden.items).contains(&".resource"));

    let items_only = api
        .list(
            "",
            ListOptions {
                sync_items_only: true,
                ..ListOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(names(&items_only.items), vec!["a.md"]);

    let files = api
        .list(
            "",
            ListOptions {
                include_dirs: false,
                ..ListOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(names(&files.items), vec!["a.md", "info.json"]);
}

// ── Retries ─────────────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_are_retried() {
    let driver = Arc::new(MemoryDriver::new().with_request_repeat_count(2));
    let api = api_on(driver.clone());
    driver.fail_next(2);
    api.put("a.md", b"x").await.unwrap();
    assert!(driver.get("a.md").await.unwrap().is_some());
}

#[tokio::test]
async fn retries_give_up_after_the_repeat_count() {
    let driver = Arc::new(MemoryDriver::new().with_request_repeat_count(1));
    let api = api_on(driver.clone());
    driver.fail_next(2);
    let err = api.put("a.md", b"x").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn repeat_count_option_overrides_the_driver() {
    let driver = Arc::new(MemoryDriver::new().with_request_repeat_count(5));
    let api = FileApi::new(
        driver.clone(),
        FileApiOptions {
            base_dir: String::new(),
            request_repeat_count: Some(0),
        },
    );
    assert_eq!(api.request_repeat_count(), 0);
    driver.fail_next(1);
    assert!(api.get("a.md").await.is_err());
}

// ── Uploads ─────────────────────────────────────────────────────

#[tokio::test]
async fn put_file_of_missing_source_fails() {
    let dir = TempDir::new().unwrap();
    let api = api_on(Arc::new(MemoryDriver::new()));
    let missing = dir.path().join("nope.bin");
    let err = api.put_file(".resource/x", &missing).await.unwrap_err();
    assert!(matches!(err, SyncError::FileNotFound(_)));
    assert_eq!(err.to_string(), format!("File not found: {}", missing.display()));
}

#[tokio::test]
async fn put_file_uploads_content() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("blob.bin");
    std::fs::write(&source, b"\x00\x01\x02").unwrap();
    let api = api_on(Arc::new(MemoryDriver::new()));
    api.put_file(".resource/x", &source).await.unwrap();
    assert_eq!(api.get(".resource/x").await.unwrap().unwrap(), b"\x00\x01\x02");
}

#[tokio::test]
async fn multi_put_requires_driver_support() {
    let api = api_on(Arc::new(MemoryDriver::new()));
    let err = api
        .multi_put(&[MultiPutItem {
            path: "a.md".to_string(),
            body: b"x".to_vec(),
        }])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Multi PUT not supported");
}

#[tokio::test]
async fn builtin_locks_require_driver_support() {
    let api = api_on(Arc::new(MemoryDriver::new()));
    assert!(!api.supports_locks());
    let err = api
        .acquire_lock(LockType::Sync, LockClientType::Cli, &ClientId::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Sync target does not support built-in locks");
}

// ── Tree operations ─────────────────────────────────────────────

#[tokio::test]
async fn tree_operations_stay_under_base_dir() {
    let driver = Arc::new(MemoryDriver::new());
    let api = FileApi::new(
        driver.clone(),
        FileApiOptions {
            base_dir: "target".to_string(),
            request_repeat_count: None,
        },
    );

    api.mkdir("folder").await.unwrap();
    assert!(api.stat("folder").await.unwrap().unwrap().is_dir);

    api.put("folder/a.md", b"a").await.unwrap();
    api.move_item("folder/a.md", "b.md").await.unwrap();
    assert!(api.get("folder/a.md").await.unwrap().is_none());

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("b.md");
    assert!(api.get_to_file("b.md", &dest).await.unwrap());
    assert_eq!(std::fs::read(&dest).unwrap(), b"a");
    assert!(!api.get_to_file("missing.md", &dir.path().join("m")).await.unwrap());

    driver.put("outside.md", b"keep").await.unwrap();
    api.clear_root().await.unwrap();
    assert!(api.get("b.md").await.unwrap().is_none());
    assert_eq!(driver.get("outside.md").await.unwrap().unwrap(), b"keep");
}

// ── Delta ───────────────────────────────────────────────────────

#[tokio::test]
async fn delta_falls_back_to_listing() {
    let api = api_on(Arc::new(MemoryDriver::new()));
    api.put("a.md", b"x").await.unwrap();
    api.put("b.md", b"y").await.unwrap();

    let page = api.delta("", &DeltaOptions::default()).await.unwrap();
    let mut ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(!page.has_more);
}

// ── Remote clock ────────────────────────────────────────────────

#[tokio::test]
async fn remote_date_follows_the_remote_clock() {
    let driver = Arc::new(MemoryDriver::new());
    driver.set_clock_offset(3_600_000);
    let api = api_on(driver);

    let remote = api.remote_date().await;
    let expected = unix_ms() + 3_600_000;
    assert!((remote - expected).abs() < 5_000, "remote={remote} expected={expected}");
}

#[tokio::test]
async fn remote_date_falls_back_to_local_clock() {
    let driver = Arc::new(MemoryDriver::new());
    let api = api_on(driver.clone());
    driver.fail_next(1);

    let remote = api.remote_date().await;
    assert!((remote - unix_ms()).abs() < 5_000);
}
