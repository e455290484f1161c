use blobsync_types::{Item, ItemCodec, ItemType, MarkdownCodec};
use pretty_assertions::assert_eq;

fn sample_note() -> Item {
    let mut item = Item::note("0123456789abcdef0123456789abcdef", "Title", "First line\n\nSecond line")
        .with_parent("1b0663e319074c0cbd966678dabde0b8")
        .with_property("ocr_text", "line one\nline two");
    item.stamp(1_718_332_305_188);
    item
}

// ── Serialize ────────────────────────────────────────────────────

#[test]
fn serialize_layout() {
    let text = MarkdownCodec.serialize(&sample_note()).unwrap();
    let expected = "Title\n\nFirst line\n\nSecond line\n\n\
        id: 0123456789abcdef0123456789abcdef\n\
        parent_id: 1b0663e319074c0cbd966678dabde0b8\n\
        created_time: 2024-06-14T02:31:45.188Z\n\
        updated_time: 2024-06-14T02:31:45.188Z\n\
        user_created_time: 2024-06-14T02:31:45.188Z\n\
        user_updated_time: 2024-06-14T02:31:45.188Z\n\
        encryption_cipher_text: \n\
        encryption_applied: 0\n\
        ocr_text: line one\\nline two\n\
        type_: 1";
    assert_eq!(text, expected);
}

#[test]
fn serialize_without_body() {
    let item = Item::new("abc", ItemType::Folder);
    let text = MarkdownCodec.serialize(&item).unwrap();
    assert!(text.starts_with("\n\nid: abc\n"));
    assert!(text.ends_with("type_: 2"));
}

// ── Unserialize ──────────────────────────────────────────────────

#[test]
fn unserialize_restores_fields() {
    let original = sample_note();
    let text = MarkdownCodec.serialize(&original).unwrap();
    let item = MarkdownCodec.unserialize(&text).unwrap();
    assert_eq!(item, original);
}

#[test]
fn unserialize_is_stable() {
    let text = MarkdownCodec.serialize(&sample_note()).unwrap();
    let again = MarkdownCodec
        .serialize(&MarkdownCodec.unserialize(&text).unwrap())
        .unwrap();
    assert_eq!(again, text);
}

#[test]
fn unserialize_resource_fields() {
    let mut item = Item::new("res", ItemType::Resource);
    item.title = Some("photo.png".into());
    item.size = Some(2048);
    item.encryption_blob_encrypted = true;
    let text = MarkdownCodec.serialize(&item).unwrap();
    let back = MarkdownCodec.unserialize(&text).unwrap();
    assert_eq!(back.size, Some(2048));
    assert!(back.encryption_blob_encrypted);
    assert!(back.is_resource());
}

#[test]
fn unserialize_missing_type_fails() {
    assert!(MarkdownCodec.unserialize("title\n\nid: abc").is_err());
}

#[test]
fn unserialize_missing_id_fails() {
    assert!(MarkdownCodec.unserialize("title\n\ntype_: 1").is_err());
}

#[test]
fn unserialize_unknown_type_fails() {
    assert!(MarkdownCodec.unserialize("t\n\nid: a\ntype_: 99").is_err());
}

#[test]
fn unserialize_bad_property_line_fails() {
    assert!(MarkdownCodec.unserialize("t\n\nid: a\nnot a property\ntype_: 1").is_err());
}

#[test]
fn escaped_title_roundtrips() {
    let item = Item::note("a", "multi\nline \\n title", "");
    let back = MarkdownCodec
        .unserialize(&MarkdownCodec.serialize(&item).unwrap())
        .unwrap();
    assert_eq!(back.title.as_deref(), Some("multi\nline \\n title"));
    assert_eq!(back.body, None);
}

// ── Fields ───────────────────────────────────────────────────────

#[test]
fn field_accessors_route_to_struct_or_properties() {
    let mut item = Item::note("a", "t", "b");
    item.set_field("title", "new");
    item.set_field("ocr_status", "2");
    assert_eq!(item.title.as_deref(), Some("new"));
    assert_eq!(item.field("ocr_status"), Some("2"));
    assert_eq!(item.field("missing"), None);
}

#[test]
fn item_type_codes() {
    assert_eq!(ItemType::Revision.code(), 13);
    assert_eq!(ItemType::try_from(9).unwrap(), ItemType::MasterKey);
    assert!(ItemType::try_from(10).is_err());
    assert!(ItemType::Note.encryption_supported());
    assert!(!ItemType::MasterKey.encryption_supported());
}
