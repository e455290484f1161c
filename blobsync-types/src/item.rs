//! Application items.
//!
//! The synchronizer only reasons about a handful of fields: the id and type,
//! the timestamps used for conflict detection and the encryption markers.
//! Everything else travels in `properties` and is round-tripped by the codec.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Numeric model type stored in the `type_` footer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum ItemType {
    Note,
    Folder,
    Setting,
    Resource,
    Tag,
    NoteTag,
    Search,
    Alarm,
    MasterKey,
    Revision,
}

impl ItemType {
    /// The wire code of this type.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            ItemType::Note => 1,
            ItemType::Folder => 2,
            ItemType::Setting => 3,
            ItemType::Resource => 4,
            ItemType::Tag => 5,
            ItemType::NoteTag => 6,
            ItemType::Search => 7,
            ItemType::Alarm => 8,
            ItemType::MasterKey => 9,
            ItemType::Revision => 13,
        }
    }

    /// Whether items of this type are encrypted when E2EE is enabled.
    #[must_use]
    pub const fn encryption_supported(self) -> bool {
        matches!(
            self,
            ItemType::Note
                | ItemType::Folder
                | ItemType::Resource
                | ItemType::Tag
                | ItemType::NoteTag
                | ItemType::Revision
        )
    }
}

impl From<ItemType> for u32 {
    fn from(t: ItemType) -> Self {
        t.code()
    }
}

impl TryFrom<u32> for ItemType {
    type Error = crate::Error;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => ItemType::Note,
            2 => ItemType::Folder,
            3 => ItemType::Setting,
            4 => ItemType::Resource,
            5 => ItemType::Tag,
            6 => ItemType::NoteTag,
            7 => ItemType::Search,
            8 => ItemType::Alarm,
            9 => ItemType::MasterKey,
            13 => ItemType::Revision,
            other => return Err(crate::Error::InvalidItemType(other.to_string())),
        })
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemType::Note => "Note",
            ItemType::Folder => "Folder",
            ItemType::Setting => "Setting",
            ItemType::Resource => "Resource",
            ItemType::Tag => "Tag",
            ItemType::NoteTag => "NoteTag",
            ItemType::Search => "Search",
            ItemType::Alarm => "Alarm",
            ItemType::MasterKey => "MasterKey",
            ItemType::Revision => "Revision",
        };
        f.write_str(name)
    }
}

/// An application item (note, folder, resource metadata, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub item_type: ItemType,
    pub parent_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub created_time: i64,
    pub updated_time: i64,
    pub user_created_time: i64,
    pub user_updated_time: i64,
    pub encryption_applied: bool,
    pub encryption_cipher_text: Option<String>,
    /// Set on resources whose remote blob is encrypted.
    pub encryption_blob_encrypted: bool,
    /// Local path of the resource blob. Never serialized.
    #[serde(skip)]
    pub local_blob_path: Option<PathBuf>,
    pub size: Option<u64>,
    /// Re-upload the blob on update. Never serialized.
    #[serde(skip)]
    pub update_blob: bool,
    /// Any other footer field, kept verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Item {
    /// Creates an empty item of the given type.
    #[must_use]
    pub fn new(id: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            id: id.into(),
            item_type,
            parent_id: None,
            title: None,
            body: None,
            created_time: 0,
            updated_time: 0,
            user_created_time: 0,
            user_updated_time: 0,
            encryption_applied: false,
            encryption_cipher_text: None,
            encryption_blob_encrypted: false,
            local_blob_path: None,
            size: None,
            update_blob: false,
            properties: BTreeMap::new(),
        }
    }

    /// Creates a note with a title and body.
    #[must_use]
    pub fn note(id: impl Into<String>, title: &str, body: &str) -> Self {
        let mut item = Self::new(id, ItemType::Note);
        item.title = Some(title.to_string());
        item.body = Some(body.to_string());
        item
    }

    /// Creates resource metadata pointing at a local blob.
    #[must_use]
    pub fn resource(id: impl Into<String>, title: &str, local_blob_path: impl Into<PathBuf>) -> Self {
        let mut item = Self::new(id, ItemType::Resource);
        item.title = Some(title.to_string());
        item.local_blob_path = Some(local_blob_path.into());
        item
    }

    /// Builder-style parent setter.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Builder-style extra property setter.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn is_resource(&self) -> bool {
        self.item_type == ItemType::Resource
    }

    /// Reads a mutable text field by footer name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => self.title.as_deref(),
            "body" => self.body.as_deref(),
            "parent_id" => self.parent_id.as_deref(),
            other => self.properties.get(other).map(String::as_str),
        }
    }

    /// Writes a mutable text field by footer name.
    pub fn set_field(&mut self, name: &str, value: &str) {
        match name {
            "title" => self.title = Some(value.to_string()),
            "body" => self.body = Some(value.to_string()),
            "parent_id" => self.parent_id = Some(value.to_string()),
            other => {
                self.properties.insert(other.to_string(), value.to_string());
            }
        }
    }

    /// Sets all four timestamps to `ms`.
    pub fn stamp(&mut self, ms: i64) {
        self.created_time = ms;
        self.updated_time = ms;
        self.user_created_time = ms;
        self.user_updated_time = ms;
    }
}
