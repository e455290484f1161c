use blobsync_crypto::{derive_key, generate_random_key, KdfParams, Salt, SymmetricKey, KEY_SIZE};

const SALT: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];

// ── derive_key ───────────────────────────────────────────────────

#[test]
fn derive_key_is_deterministic() {
    let salt = Salt::from_bytes(SALT);
    let params = KdfParams::insecure_fast();
    let k1 = derive_key("password", &salt, &params).unwrap();
    let k2 = derive_key("password", &salt, &params).unwrap();
    assert_eq!(k1.as_bytes(), k2.as_bytes());
}

#[test]
fn different_passwords_produce_different_keys() {
    let salt = Salt::from_bytes(SALT);
    let params = KdfParams::insecure_fast();
    let k1 = derive_key("password1", &salt, &params).unwrap();
    let k2 = derive_key("password2", &salt, &params).unwrap();
    assert_ne!(k1.as_bytes(), k2.as_bytes());
}

#[test]
fn invalid_params_fail() {
    let params = KdfParams {
        memory_cost: 1,
        time_cost: 0,
        parallelism: 0,
    };
    assert!(derive_key("p", &Salt::random(), &params).is_err());
}

#[test]
fn default_params_are_owasp() {
    let params = KdfParams::default();
    assert_eq!(params.memory_cost, 19 * 1024);
    assert_eq!(params.time_cost, 2);
}

// ── Keys and salts ───────────────────────────────────────────────

#[test]
fn random_keys_differ() {
    assert_ne!(generate_random_key().as_bytes(), generate_random_key().as_bytes());
}

#[test]
fn from_slice_checks_length() {
    assert!(SymmetricKey::from_slice(&[0u8; KEY_SIZE]).is_ok());
    assert!(SymmetricKey::from_slice(&[0u8; 31]).is_err());
}

#[test]
fn debug_redacts_key() {
    let debug = format!("{:?}", generate_random_key());
    assert!(debug.contains("REDACTED"));
}

#[test]
fn salt_serializes_as_base64() {
    let salt = Salt::from_bytes(SALT);
    let json = serde_json::to_string(&salt).unwrap();
    assert_eq!(json, "\"AQIDBAUGBwgJCgsMDQ4PEA==\"");
    let back: Salt = serde_json::from_str(&json).unwrap();
    assert_eq!(back, salt);
}

#[test]
fn salt_rejects_wrong_length() {
    assert!(serde_json::from_str::<Salt>("\"AQID\"").is_err());
}
