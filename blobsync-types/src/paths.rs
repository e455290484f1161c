//! Well-known remote paths.
//!
//! ```text
//! info.json                                   sync info document
//! locks/<type>_<clientType>_<clientId>.json   lock files
//! <id>.md                                     item metadata
//! .resource/<id>                              resource blobs
//! .sync/version.txt                           legacy version marker
//! temp/                                       clock probes
//! ```

/// Sync info document.
pub const INFO_FILE: &str = "info.json";

/// Legacy version marker of pre-`info.json` targets.
pub const LEGACY_VERSION_FILE: &str = ".sync/version.txt";

/// Directory holding lock files.
pub const LOCK_DIR: &str = "locks";

/// Directory holding resource blobs.
pub const RESOURCE_DIR: &str = ".resource";

/// Directory holding temporary files.
pub const TEMP_DIR: &str = "temp";

const ITEM_EXTENSION: &str = ".md";

/// Metadata path of an item.
#[must_use]
pub fn item_path(id: &str) -> String {
    format!("{id}{ITEM_EXTENSION}")
}

/// Remote blob path of a resource.
#[must_use]
pub fn resource_path(id: &str) -> String {
    format!("{RESOURCE_DIR}/{id}")
}

/// Returns true for `<id>.md` paths at the root.
#[must_use]
pub fn is_item_path(path: &str) -> bool {
    match path.strip_suffix(ITEM_EXTENSION) {
        Some(stem) => !stem.is_empty() && !stem.contains('/') && !stem.starts_with('.'),
        None => false,
    }
}

/// Extracts the item id from an item path.
#[must_use]
pub fn path_to_id(path: &str) -> Option<&str> {
    if is_item_path(path) {
        path.strip_suffix(ITEM_EXTENSION)
    } else {
        None
    }
}

/// Returns true if any component of `path` starts with a dot.
#[must_use]
pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|part| part.starts_with('.'))
}

/// Joins two path fragments with a single `/`, ignoring empty parts.
#[must_use]
pub fn join(base: &str, path: &str) -> String {
    match (base.trim_end_matches('/'), path.trim_start_matches('/')) {
        ("", p) => p.to_string(),
        (b, "") => b.to_string(),
        (b, p) => format!("{b}/{p}"),
    }
}

/// Returns the last path component.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
