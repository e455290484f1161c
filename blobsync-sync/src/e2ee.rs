//! End-to-end encryption of items and resource blobs.
//!
//! When encryption is on, an item is uploaded as a reduced envelope: the
//! fields the sync protocol needs stay readable (id, parent, type,
//! `updated_time`), everything else is serialized, encrypted and stored in
//! `encryption_cipher_text`. Resource blobs are encrypted into a temporary
//! `<blob>.crypted` file that is uploaded in place of the plaintext.

use crate::error::{SyncError, SyncResult};
use blobsync_crypto::{EncryptionService, PublicPrivateKeyPair};
use blobsync_types::{Item, ItemCodec};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Properties that stay in clear text in an encrypted envelope.
const ENVELOPE_PROPERTIES: [&str; 3] = ["note_id", "tag_id", "share_id"];

/// Suffix of encrypted blob files.
pub const CRYPTED_SUFFIX: &str = ".crypted";

/// The encryption settings a client syncs with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct E2eeInfo {
    pub e2ee: bool,
    pub ppk: Option<PublicPrivateKeyPair>,
    pub active_master_key_id: Option<String>,
}

impl E2eeInfo {
    /// Encryption off.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Encryption on with the given key pair.
    pub fn enabled(ppk: Option<PublicPrivateKeyPair>) -> Self {
        Self {
            e2ee: true,
            ppk,
            active_master_key_id: None,
        }
    }

    pub fn ppk_id(&self) -> Option<&str> {
        self.ppk.as_ref().map(|p| p.id.as_str())
    }
}

/// Serializes `item` for upload, encrypting it when `service` is given and
/// the item type supports encryption.
pub fn serialize_for_sync(
    item: &Item,
    codec: &dyn ItemCodec,
    service: Option<&dyn EncryptionService>,
) -> SyncResult<String> {
    let Some(service) = service.filter(|_| item.item_type.encryption_supported()) else {
        return Ok(codec.serialize(item)?);
    };
    if item.encryption_applied {
        return Err(SyncError::AlreadyEncrypted(item.id.clone()));
    }

    let cipher_text = service.encrypt_string(&codec.serialize(item)?)?;

    let mut envelope = Item::new(item.id.clone(), item.item_type);
    envelope.parent_id = item.parent_id.clone();
    envelope.updated_time = item.updated_time;
    for key in ENVELOPE_PROPERTIES {
        if let Some(value) = item.properties.get(key) {
            envelope.properties.insert(key.to_string(), value.clone());
        }
    }
    envelope.encryption_applied = true;
    envelope.encryption_cipher_text = Some(cipher_text);
    Ok(codec.serialize(&envelope)?)
}

/// Opens an encrypted envelope. Plain items are returned unchanged.
pub fn decrypt_item(
    item: Item,
    codec: &dyn ItemCodec,
    service: Option<&dyn EncryptionService>,
) -> SyncResult<Item> {
    if !item.encryption_applied {
        return Ok(item);
    }
    let service = service.ok_or(SyncError::EncryptionDisabled)?;
    let cipher_text = item.encryption_cipher_text.as_deref().unwrap_or_default();
    let plain_text = service.decrypt_string(cipher_text)?;

    let mut plain = codec.unserialize(&plain_text)?;
    plain.updated_time = item.updated_time;
    plain.encryption_applied = false;
    plain.encryption_cipher_text = None;
    Ok(plain)
}

/// Parses remote item content and opens it if encrypted.
pub fn unserialize_for_sync(
    content: &[u8],
    codec: &dyn ItemCodec,
    service: Option<&dyn EncryptionService>,
) -> SyncResult<Item> {
    let text = std::str::from_utf8(content)
        .map_err(|e| blobsync_types::Error::Unserialize(format!("item is not valid UTF-8: {e}")))?;
    decrypt_item(codec.unserialize(text)?, codec, service)
}

/// Path of the file to upload for a resource blob.
///
/// With encryption on, the blob is encrypted into `<local>.crypted` and the
/// returned item is flagged `encryption_blob_encrypted`. The caller removes
/// the temporary file after the upload.
pub async fn full_path_for_sync_upload(
    item: &Item,
    local_path: &Path,
    service: Option<&dyn EncryptionService>,
) -> SyncResult<(PathBuf, Item)> {
    let mut prepared = item.clone();
    let Some(service) = service.filter(|_| item.item_type.encryption_supported()) else {
        if item.encryption_blob_encrypted {
            return Err(SyncError::EncryptionDisabled);
        }
        return Ok((local_path.to_path_buf(), prepared));
    };

    let plain = tokio::fs::read(local_path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => SyncError::FileNotFound(format!(
            "Blob not found in path: {}",
            local_path.display()
        )),
        _ => SyncError::Io(e),
    })?;
    let encrypted = service.encrypt_bytes(&plain)?;

    let mut crypted = local_path.as_os_str().to_owned();
    crypted.push(CRYPTED_SUFFIX);
    let crypted = PathBuf::from(crypted);
    tokio::fs::write(&crypted, encrypted).await?;
    debug!("encrypted blob of {} to {}", item.id, crypted.display());

    prepared.encryption_blob_encrypted = true;
    Ok((crypted, prepared))
}

/// Decrypts a downloaded blob if the resource says it is encrypted.
pub fn decrypt_blob(
    item: &Item,
    content: Vec<u8>,
    service: Option<&dyn EncryptionService>,
) -> SyncResult<Vec<u8>> {
    if !item.encryption_blob_encrypted {
        return Ok(content);
    }
    let service = service.ok_or(SyncError::EncryptionDisabled)?;
    Ok(service.decrypt_bytes(&content)?)
}
