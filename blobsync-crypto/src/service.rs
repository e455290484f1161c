//! Encryption service used by the synchronizer.
//!
//! The synchronizer depends on `Arc<dyn EncryptionService>` and never sees
//! raw keys. Every ciphertext records the id of the master key that produced
//! it, so any loaded key can decrypt, while new data always uses the active
//! key.

use crate::cipher::{self, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::SymmetricKey;
use crate::master_key::MasterKeyEntity;
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

const HEADER: &str = "BSE1";

/// Encrypts and decrypts item payloads and resource blobs.
pub trait EncryptionService: Send + Sync {
    /// Id of the key used for new ciphertexts.
    fn active_master_key_id(&self) -> Option<String>;

    /// Switches the key used for new ciphertexts.
    fn set_active_master_key_id(&self, id: Option<String>);

    fn encrypt_string(&self, plaintext: &str) -> CryptoResult<String>;

    fn decrypt_string(&self, ciphertext: &str) -> CryptoResult<String>;

    fn encrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;

    fn decrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// [`EncryptionService`] backed by in-memory master keys.
#[derive(Default)]
pub struct MasterKeyEncryptionService {
    keys: RwLock<HashMap<String, SymmetricKey>>,
    active: RwLock<Option<String>>,
}

impl MasterKeyEncryptionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwraps `entity` with `password` and keeps the key in memory.
    pub fn load_master_key(&self, entity: &MasterKeyEntity, password: &str) -> CryptoResult<()> {
        let key = entity.decrypt(password)?;
        self.load_key(&entity.id, key);
        Ok(())
    }

    /// Keeps an already unwrapped key in memory.
    pub fn load_key(&self, id: &str, key: SymmetricKey) {
        debug!(master_key_id = %id, "loaded master key");
        self.keys.write().insert(id.to_string(), key);
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.keys.read().contains_key(id)
    }

    /// Forgets every loaded key.
    pub fn unload_all(&self) {
        self.keys.write().clear();
    }

    fn with_key<T>(&self, id: &str, f: impl FnOnce(&SymmetricKey) -> CryptoResult<T>) -> CryptoResult<T> {
        let keys = self.keys.read();
        let key = keys
            .get(id)
            .ok_or_else(|| CryptoError::MasterKeyNotLoaded(id.to_string()))?;
        f(key)
    }

    fn active_id(&self) -> CryptoResult<String> {
        self.active.read().clone().ok_or(CryptoError::NoActiveMasterKey)
    }
}

impl EncryptionService for MasterKeyEncryptionService {
    fn active_master_key_id(&self) -> Option<String> {
        self.active.read().clone()
    }

    fn set_active_master_key_id(&self, id: Option<String>) {
        *self.active.write() = id;
    }

    fn encrypt_string(&self, plaintext: &str) -> CryptoResult<String> {
        let bytes = self.encrypt_bytes(plaintext.as_bytes())?;
        Ok(STANDARD.encode(bytes))
    }

    fn decrypt_string(&self, ciphertext: &str) -> CryptoResult<String> {
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;
        let plaintext = self.decrypt_bytes(&bytes)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
    }

    fn encrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let id = self.active_id()?;
        let encrypted = self.with_key(&id, |key| cipher::encrypt(key, data))?;

        // HEADER ':' id ':' nonce || ciphertext
        let mut out = Vec::with_capacity(HEADER.len() + id.len() + 2 + encrypted.len());
        out.extend_from_slice(HEADER.as_bytes());
        out.push(b':');
        out.extend_from_slice(id.as_bytes());
        out.push(b':');
        out.extend_from_slice(&encrypted.to_bytes());
        Ok(out)
    }

    fn decrypt_bytes(&self, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let rest = data
            .strip_prefix(HEADER.as_bytes())
            .and_then(|r| r.strip_prefix(b":"))
            .ok_or_else(|| CryptoError::Decryption("missing ciphertext header".to_string()))?;
        let sep = rest
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| CryptoError::Decryption("missing master key id".to_string()))?;
        let id = std::str::from_utf8(&rest[..sep])
            .map_err(|_| CryptoError::Decryption("invalid master key id".to_string()))?;
        let encrypted = EncryptedData::from_bytes(&rest[sep + 1..])?;
        self.with_key(id, |key| cipher::decrypt(key, &encrypted))
    }
}
