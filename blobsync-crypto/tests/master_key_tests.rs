use blobsync_crypto::{CryptoError, KdfParams, MasterKeyEntity, PublicPrivateKeyPair, ENCRYPTION_METHOD};

fn fast() -> KdfParams {
    KdfParams::insecure_fast()
}

// ── MasterKeyEntity ──────────────────────────────────────────────

#[test]
fn generate_then_decrypt() {
    let (entity, key) = MasterKeyEntity::generate("secret", &fast(), "blobsync-test").unwrap();
    assert_eq!(entity.id.len(), 32);
    assert_eq!(entity.encryption_method, ENCRYPTION_METHOD);
    assert!(entity.enabled);
    assert!(!entity.has_been_used);
    let decrypted = entity.decrypt("secret").unwrap();
    assert_eq!(decrypted.as_bytes(), key.as_bytes());
}

#[test]
fn wrong_password_is_reported() {
    let (entity, _) = MasterKeyEntity::generate("secret", &fast(), "t").unwrap();
    assert!(matches!(entity.decrypt("nope"), Err(CryptoError::InvalidPassword(id)) if id == entity.id));
}

#[test]
fn tampered_checksum_is_reported() {
    let (mut entity, _) = MasterKeyEntity::generate("secret", &fast(), "t").unwrap();
    entity.checksum = "00".repeat(32);
    assert!(matches!(entity.decrypt("secret"), Err(CryptoError::InvalidPassword(_))));
}

#[test]
fn foreign_method_is_unsupported() {
    let (mut entity, _) = MasterKeyEntity::generate("secret", &fast(), "t").unwrap();
    entity.encryption_method = 4;
    assert!(matches!(entity.decrypt("secret"), Err(CryptoError::UnsupportedMethod(4))));
}

#[test]
fn has_been_used_defaults_to_true() {
    let json = r#"{"id":"abc","encryption_method":10}"#;
    let entity: MasterKeyEntity = serde_json::from_str(json).unwrap();
    assert!(entity.has_been_used);
    assert!(entity.enabled);
}

#[test]
fn redacted_drops_key_material() {
    let (entity, _) = MasterKeyEntity::generate("secret", &fast(), "t").unwrap();
    let redacted = entity.redacted();
    assert!(redacted.content.is_empty());
    assert!(redacted.checksum.is_empty());
    let json = serde_json::to_string(&redacted).unwrap();
    assert!(!json.contains("content"));
}

// ── PublicPrivateKeyPair ─────────────────────────────────────────

#[test]
fn ppk_generate_then_decrypt() {
    let ppk = PublicPrivateKeyPair::generate("secret", &fast()).unwrap();
    assert_eq!(ppk.key_size, 256);
    let secret = ppk.decrypt_private_key("secret").unwrap();
    assert_eq!(secret.public_key().as_bytes(), ppk.public_key().unwrap().as_bytes());
}

#[test]
fn ppk_wrong_password_fails() {
    let ppk = PublicPrivateKeyPair::generate("secret", &fast()).unwrap();
    assert!(ppk.decrypt_private_key("other").is_err());
}

#[test]
fn ppk_serializes_camel_case() {
    let ppk = PublicPrivateKeyPair::generate("secret", &fast()).unwrap();
    let json = serde_json::to_string(&ppk).unwrap();
    assert!(json.contains("\"publicKey\""));
    assert!(json.contains("\"privateKey\""));
    assert!(json.contains("\"encryptionMethod\""));
}

#[test]
fn ppk_redacted_truncates() {
    let ppk = PublicPrivateKeyPair::generate("secret", &fast()).unwrap();
    let redacted = ppk.redacted();
    assert!(redacted.private_key.ciphertext.contains("..."));
    assert!(redacted.private_key.ciphertext.len() < ppk.private_key.ciphertext.len());
    assert_eq!(redacted.id, ppk.id);
}
