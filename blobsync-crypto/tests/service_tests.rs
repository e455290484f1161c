use blobsync_crypto::{
    generate_random_key, CryptoError, EncryptionService, KdfParams, MasterKeyEncryptionService,
    MasterKeyEntity,
};

fn service_with_key(id: &str) -> MasterKeyEncryptionService {
    let service = MasterKeyEncryptionService::new();
    service.load_key(id, generate_random_key());
    service.set_active_master_key_id(Some(id.to_string()));
    service
}

#[test]
fn string_roundtrip() {
    let service = service_with_key("k1");
    let ciphertext = service.encrypt_string("hello").unwrap();
    assert_ne!(ciphertext, "hello");
    assert_eq!(service.decrypt_string(&ciphertext).unwrap(), "hello");
}

#[test]
fn bytes_roundtrip() {
    let service = service_with_key("k1");
    let data: Vec<u8> = (0..=255).collect();
    let encrypted = service.encrypt_bytes(&data).unwrap();
    assert!(encrypted.starts_with(b"BSE1:k1:"));
    assert_eq!(service.decrypt_bytes(&encrypted).unwrap(), data);
}

#[test]
fn encrypt_without_active_key_fails() {
    let service = MasterKeyEncryptionService::new();
    assert!(matches!(service.encrypt_string("x"), Err(CryptoError::NoActiveMasterKey)));
}

#[test]
fn decrypt_with_unloaded_key_fails() {
    let ciphertext = service_with_key("k1").encrypt_string("x").unwrap();
    let other = service_with_key("k2");
    assert!(matches!(
        other.decrypt_string(&ciphertext),
        Err(CryptoError::MasterKeyNotLoaded(id)) if id == "k1"
    ));
}

#[test]
fn old_keys_still_decrypt_after_rotation() {
    let service = service_with_key("k1");
    let old = service.encrypt_string("before").unwrap();
    service.load_key("k2", generate_random_key());
    service.set_active_master_key_id(Some("k2".into()));
    let new = service.encrypt_string("after").unwrap();
    assert_eq!(service.decrypt_string(&old).unwrap(), "before");
    assert_eq!(service.decrypt_string(&new).unwrap(), "after");
}

#[test]
fn decrypt_rejects_missing_header() {
    let service = service_with_key("k1");
    assert!(service.decrypt_bytes(b"plain text").is_err());
}

#[test]
fn load_master_key_with_password() {
    let (entity, _) = MasterKeyEntity::generate("pw", &KdfParams::insecure_fast(), "t").unwrap();
    let service = MasterKeyEncryptionService::new();
    service.load_master_key(&entity, "pw").unwrap();
    assert!(service.is_loaded(&entity.id));
    service.unload_all();
    assert!(!service.is_loaded(&entity.id));
}
