use blobsync_types::timestamp::{format_iso, parse_iso, unix_ms};

// ── unix_ms ──────────────────────────────────────────────────────

#[test]
fn unix_ms_is_after_2024() {
    assert!(unix_ms() > 1_704_067_200_000);
}

#[test]
fn unix_ms_is_monotonic_enough() {
    let a = unix_ms();
    let b = unix_ms();
    assert!(b >= a);
}

// ── format_iso ───────────────────────────────────────────────────

#[test]
fn format_has_millisecond_precision() {
    assert_eq!(format_iso(1_718_332_305_188), "2024-06-14T02:31:45.188Z");
}

#[test]
fn format_zero_is_empty() {
    assert_eq!(format_iso(0), "");
}

#[test]
fn format_whole_second_keeps_millis() {
    assert_eq!(format_iso(1_000), "1970-01-01T00:00:01.000Z");
}

// ── parse_iso ────────────────────────────────────────────────────

#[test]
fn parse_inverts_format() {
    let ms = 1_718_332_305_188;
    assert_eq!(parse_iso(&format_iso(ms)).unwrap(), ms);
}

#[test]
fn parse_empty_is_zero() {
    assert_eq!(parse_iso("").unwrap(), 0);
    assert_eq!(parse_iso("  ").unwrap(), 0);
}

#[test]
fn parse_accepts_offsets() {
    assert_eq!(
        parse_iso("2024-06-14T04:31:45.188+02:00").unwrap(),
        1_718_332_305_188
    );
}

#[test]
fn parse_garbage_fails() {
    let err = parse_iso("yesterday").unwrap_err();
    assert!(err.to_string().contains("yesterday"));
}
