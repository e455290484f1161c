//! Item serialization.
//!
//! The synchronizer never looks inside item files itself; it goes through an
//! [`ItemCodec`]. [`MarkdownCodec`] is the reference format:
//!
//! ```text
//! <title>
//!
//! <body, any number of lines>
//!
//! id: 9f3c...
//! parent_id: ...
//! updated_time: 2024-06-14T02:31:45.188Z
//! ...
//! type_: 1
//! ```
//!
//! Footer values have newlines escaped so each property stays on one line.

use crate::item::{Item, ItemType};
use crate::timestamp::{format_iso, parse_iso};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Converts items to and from their remote representation.
pub trait ItemCodec: Send + Sync {
    /// Serializes an item to the text stored at `<id>.md`.
    fn serialize(&self, item: &Item) -> Result<String>;

    /// Parses the text stored at `<id>.md`.
    fn unserialize(&self, content: &str) -> Result<Item>;
}

/// Title, body and `key: value` footer.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownCodec;

const TIME_FIELDS: [&str; 4] = [
    "created_time",
    "updated_time",
    "user_created_time",
    "user_updated_time",
];

impl ItemCodec for MarkdownCodec {
    fn serialize(&self, item: &Item) -> Result<String> {
        let mut props: Vec<(String, String)> = Vec::new();
        let mut push = |key: &str, value: String| props.push((key.to_string(), escape(&value)));

        push("id", item.id.clone());
        push("parent_id", item.parent_id.clone().unwrap_or_default());
        push("created_time", format_iso(item.created_time));
        push("updated_time", format_iso(item.updated_time));
        push("user_created_time", format_iso(item.user_created_time));
        push("user_updated_time", format_iso(item.user_updated_time));
        push(
            "encryption_cipher_text",
            item.encryption_cipher_text.clone().unwrap_or_default(),
        );
        push("encryption_applied", flag(item.encryption_applied));
        if item.is_resource() {
            push("encryption_blob_encrypted", flag(item.encryption_blob_encrypted));
        }
        if let Some(size) = item.size {
            push("size", size.to_string());
        }
        for (key, value) in &item.properties {
            push(key, value.clone());
        }
        push("type_", item.item_type.code().to_string());

        let mut blocks = vec![item.title.as_deref().map(escape).unwrap_or_default()];
        if let Some(body) = item.body.as_deref().filter(|b| !b.is_empty()) {
            blocks.push(body.to_string());
        }
        blocks.push(
            props
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        Ok(blocks.join("\n\n"))
    }

    fn unserialize(&self, content: &str) -> Result<Item> {
        let lines: Vec<&str> = content.split('\n').collect();

        // Footer: read from the end up to the first blank line.
        let mut props = BTreeMap::new();
        let mut split = 0;
        for (i, line) in lines.iter().enumerate().rev() {
            let line = line.trim();
            if line.is_empty() {
                split = i;
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Unserialize(format!("invalid property format: {line}")))?;
            props.insert(key.trim().to_string(), unescape(value.trim()));
        }

        let type_value = props
            .remove("type_")
            .ok_or_else(|| Error::Unserialize("missing required property: type_".into()))?;
        let type_code: u32 = type_value
            .parse()
            .map_err(|_| Error::InvalidItemType(type_value.clone()))?;
        let id = props
            .remove("id")
            .ok_or_else(|| Error::Unserialize("missing required property: id".into()))?;

        let mut item = Item::new(id, ItemType::try_from(type_code)?);

        let head = &lines[..split];
        if let Some((title, rest)) = head.split_first() {
            item.title = Some(unescape(title));
            // The line after the title is the block separator.
            let body = rest.get(1..).unwrap_or_default();
            if !body.is_empty() {
                item.body = Some(body.join("\n"));
            }
        }

        for field in TIME_FIELDS {
            let ms = match props.remove(field) {
                Some(v) => parse_iso(&v)?,
                None => 0,
            };
            match field {
                "created_time" => item.created_time = ms,
                "updated_time" => item.updated_time = ms,
                "user_created_time" => item.user_created_time = ms,
                _ => item.user_updated_time = ms,
            }
        }

        item.parent_id = props.remove("parent_id").filter(|v| !v.is_empty());
        item.encryption_cipher_text = props.remove("encryption_cipher_text").filter(|v| !v.is_empty());
        item.encryption_applied = props.remove("encryption_applied").is_some_and(|v| v == "1");
        item.encryption_blob_encrypted = props
            .remove("encryption_blob_encrypted")
            .is_some_and(|v| v == "1");
        if let Some(size) = props.remove("size") {
            item.size = Some(
                size.parse()
                    .map_err(|_| Error::Unserialize(format!("invalid size: {size}")))?,
            );
        }
        item.properties = props;
        Ok(item)
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
