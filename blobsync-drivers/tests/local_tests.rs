use blobsync_drivers::{DriverError, LocalDriver, StorageDriver};
use tempfile::TempDir;

fn driver() -> (TempDir, LocalDriver) {
    let temp = TempDir::new().unwrap();
    let driver = LocalDriver::new(temp.path().join("sync"));
    (temp, driver)
}

// ── Lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn initialize_creates_root() {
    let (_temp, driver) = driver();
    driver.initialize("").await.unwrap();
    assert!(driver.root().is_dir());
    driver.initialize("").await.unwrap();
}

#[tokio::test]
async fn put_get_stat() {
    let (_temp, driver) = driver();
    driver.put("locks/1_1_c.json", b"{}").await.unwrap();
    assert_eq!(driver.get("locks/1_1_c.json").await.unwrap().unwrap(), b"{}");
    let stat = driver.stat("locks/1_1_c.json").await.unwrap().unwrap();
    assert_eq!(stat.path, "locks/1_1_c.json");
    assert!(stat.updated_time > 0);
    assert!(driver.stat("locks").await.unwrap().unwrap().is_dir);
}

#[tokio::test]
async fn missing_paths() {
    let (_temp, driver) = driver();
    driver.initialize("").await.unwrap();
    assert!(driver.get("nope.md").await.unwrap().is_none());
    assert!(driver.stat("nope.md").await.unwrap().is_none());
    driver.delete("nope.md").await.unwrap();
    assert!(driver.list("nope").await.unwrap().items.is_empty());
}

#[tokio::test]
async fn list_is_sorted_and_relative() {
    let (_temp, driver) = driver();
    driver.put("b.md", b"2").await.unwrap();
    driver.put("a.md", b"1").await.unwrap();
    driver.mkdir(".resource").await.unwrap();
    let list = driver.list("").await.unwrap();
    let names: Vec<&str> = list.items.iter().map(|s| s.path.as_str()).collect();
    assert_eq!(names, vec![".resource", "a.md", "b.md"]);
    assert!(list.items[0].is_dir);
}

#[tokio::test]
async fn rejects_escaping_paths() {
    let (_temp, driver) = driver();
    assert!(matches!(driver.get("../secret").await, Err(DriverError::Storage(_))));
}

// ── Files ───────────────────────────────────────────────────────

#[tokio::test]
async fn put_file_copies_source() {
    let (temp, driver) = driver();
    let source = temp.path().join("blob.bin");
    std::fs::write(&source, b"blob").unwrap();
    driver.put_file(".resource/r", &source).await.unwrap();
    assert_eq!(driver.get(".resource/r").await.unwrap().unwrap(), b"blob");

    let dest = temp.path().join("out.bin");
    assert!(driver.get_to_file(".resource/r", &dest).await.unwrap());
    assert_eq!(std::fs::read(dest).unwrap(), b"blob");
}

#[tokio::test]
async fn put_file_missing_source() {
    let (temp, driver) = driver();
    let err = driver.put_file("r", &temp.path().join("missing")).await.unwrap_err();
    assert!(matches!(err, DriverError::FileNotFound(_)));
}

#[tokio::test]
async fn move_delete_and_clear() {
    let (_temp, driver) = driver();
    driver.put("dir/a", b"1").await.unwrap();
    driver.move_item("dir/a", "other/b").await.unwrap();
    assert!(driver.get("dir/a").await.unwrap().is_none());
    assert!(driver.get("other/b").await.unwrap().is_some());

    driver.delete("other").await.unwrap();
    assert!(driver.stat("other").await.unwrap().is_none());

    driver.put("x", b"1").await.unwrap();
    driver.format().await.unwrap();
    assert!(driver.list("").await.unwrap().items.is_empty());
    assert!(driver.root().is_dir());
}
