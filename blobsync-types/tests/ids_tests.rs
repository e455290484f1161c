use blobsync_types::{create_uuid, ClientId};
use std::collections::HashSet;
use std::str::FromStr;

// ── create_uuid ───────────────────────────────────────────────────

#[test]
fn uuid_is_32_lowercase_hex() {
    let id = create_uuid();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn uuids_are_unique() {
    let ids: HashSet<String> = (0..100).map(|_| create_uuid()).collect();
    assert_eq!(ids.len(), 100);
}

// ── ClientId ──────────────────────────────────────────────────────

#[test]
fn client_id_new_is_unique() {
    assert_ne!(ClientId::new(), ClientId::new());
}

#[test]
fn client_id_default_is_valid() {
    let id = ClientId::default();
    assert!(ClientId::is_valid(id.as_str()));
}

#[test]
fn client_id_display_matches_as_str() {
    let id = ClientId::from("client-1");
    assert_eq!(id.to_string(), "client-1");
    assert_eq!(id.as_str(), "client-1");
}

#[test]
fn client_id_from_str_accepts_alnum_and_dash() {
    let id = ClientId::from_str("abc-123").unwrap();
    assert_eq!(id.as_str(), "abc-123");
}

#[test]
fn client_id_from_str_rejects_separators() {
    assert!(ClientId::from_str("a_b").is_err());
    assert!(ClientId::from_str("a/b").is_err());
    assert!(ClientId::from_str("").is_err());
}

#[test]
fn client_id_serde_is_transparent() {
    let id = ClientId::from("abc");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"abc\"");
    let back: ClientId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn client_id_ordering_is_lexicographic() {
    assert!(ClientId::from("a") < ClientId::from("b"));
}
