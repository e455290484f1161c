use blobsync_crypto::{generate_random_key, EncryptionService, MasterKeyEncryptionService};
use blobsync_sync::e2ee::{
    decrypt_blob, decrypt_item, full_path_for_sync_upload, serialize_for_sync, unserialize_for_sync,
    CRYPTED_SUFFIX,
};
use blobsync_sync::SyncError;
use blobsync_types::{Item, ItemCodec, ItemType, MarkdownCodec};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn service() -> MasterKeyEncryptionService {
    let service = MasterKeyEncryptionService::new();
    service.load_key("mk1", generate_random_key());
    service.set_active_master_key_id(Some("mk1".to_string()));
    service
}

fn note() -> Item {
    let mut item = Item::note("n1", "Private", "Do not read")
        .with_parent("folder1")
        .with_property("note_id", "n0")
        .with_property("source_url", "https://example.com");
    item.stamp(1_700_000_000_000);
    item
}

// ── Items ───────────────────────────────────────────────────────

#[test]
fn without_service_items_are_plain() {
    let text = serialize_for_sync(&note(), &MarkdownCodec, None).unwrap();
    assert!(text.contains("Do not read"));
    assert_eq!(text, MarkdownCodec.serialize(&note()).unwrap());
}

#[test]
fn envelope_keeps_only_sync_fields_in_clear() {
    let service = service();
    let text = serialize_for_sync(&note(), &MarkdownCodec, Some(&service)).unwrap();
    assert!(!text.contains("Private"));
    assert!(!text.contains("source_url"));

    let envelope = MarkdownCodec.unserialize(&text).unwrap();
    assert!(envelope.encryption_applied);
    assert_eq!(envelope.id, "n1");
    assert_eq!(envelope.parent_id.as_deref(), Some("folder1"));
    assert_eq!(envelope.updated_time, 1_700_000_000_000);
    assert_eq!(envelope.properties.get("note_id").map(String::as_str), Some("n0"));
}

#[test]
fn encrypted_item_opens_to_the_original() {
    let service = service();
    let text = serialize_for_sync(&note(), &MarkdownCodec, Some(&service)).unwrap();
    let item = unserialize_for_sync(text.as_bytes(), &MarkdownCodec, Some(&service)).unwrap();

    let expected = note();
    assert_eq!(item.title, expected.title);
    assert_eq!(item.body, expected.body);
    assert_eq!(item.properties, expected.properties);
    assert_eq!(item.updated_time, expected.updated_time);
    assert!(!item.encryption_applied);
    assert!(item.encryption_cipher_text.is_none());
}

#[test]
fn encrypting_twice_is_refused() {
    let service = service();
    let mut item = note();
    item.encryption_applied = true;
    let err = serialize_for_sync(&item, &MarkdownCodec, Some(&service)).unwrap_err();
    assert!(matches!(err, SyncError::AlreadyEncrypted(ref id) if id == "n1"));
}

#[test]
fn types_without_encryption_support_stay_plain() {
    let service = service();
    let mut key_item = Item::new("mk", ItemType::MasterKey);
    key_item.title = Some("visible".to_string());
    let text = serialize_for_sync(&key_item, &MarkdownCodec, Some(&service)).unwrap();
    assert!(text.contains("visible"));
}

#[test]
fn opening_without_service_fails() {
    let service = service();
    let text = serialize_for_sync(&note(), &MarkdownCodec, Some(&service)).unwrap();
    let envelope = MarkdownCodec.unserialize(&text).unwrap();
    let err = decrypt_item(envelope, &MarkdownCodec, None).unwrap_err();
    assert!(matches!(err, SyncError::EncryptionDisabled));
}

#[test]
fn plain_items_pass_through_decrypt() {
    let item = note();
    assert_eq!(decrypt_item(item.clone(), &MarkdownCodec, None).unwrap(), item);
}

#[test]
fn non_utf8_content_is_rejected() {
    let err = unserialize_for_sync(&[0xff, 0xfe], &MarkdownCodec, None).unwrap_err();
    assert!(matches!(err, SyncError::Types(_)));
}

// ── Blobs ───────────────────────────────────────────────────────

#[tokio::test]
async fn blob_is_encrypted_to_a_side_file() {
    let dir = TempDir::new().unwrap();
    let blob = dir.path().join("r1");
    std::fs::write(&blob, b"blob bytes").unwrap();
    let service = service();
    let resource = Item::resource("r1", "r", &blob);

    let (path, prepared) = full_path_for_sync_upload(&resource, &blob, Some(&service))
        .await
        .unwrap();
    assert_eq!(path, dir.path().join(format!("r1{CRYPTED_SUFFIX}")));
    assert!(prepared.encryption_blob_encrypted);

    let encrypted = std::fs::read(&path).unwrap();
    assert_ne!(encrypted, b"blob bytes");
    assert_eq!(decrypt_blob(&prepared, encrypted, Some(&service)).unwrap(), b"blob bytes");
}

#[tokio::test]
async fn plain_blob_is_uploaded_from_its_own_path() {
    let dir = TempDir::new().unwrap();
    let blob = dir.path().join("r1");
    std::fs::write(&blob, b"x").unwrap();
    let resource = Item::resource("r1", "r", &blob);

    let (path, prepared) = full_path_for_sync_upload(&resource, &blob, None).await.unwrap();
    assert_eq!(path, blob);
    assert!(!prepared.encryption_blob_encrypted);
}

#[tokio::test]
async fn missing_blob_is_reported() {
    let dir = TempDir::new().unwrap();
    let blob = dir.path().join("missing");
    let resource = Item::resource("r1", "r", &blob);
    let err = full_path_for_sync_upload(&resource, &blob, Some(&service()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), format!("Blob not found in path: {}", blob.display()));
}

#[test]
fn encrypted_blob_needs_a_service() {
    let mut resource = Item::new("r1", ItemType::Resource);
    resource.encryption_blob_encrypted = true;
    let err = decrypt_blob(&resource, b"ciphertext".to_vec(), None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Trying to access encrypted resource but encryption is currently disabled"
    );
}
