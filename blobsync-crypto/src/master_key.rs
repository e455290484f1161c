//! Master keys.
//!
//! A master key is a random content key. Only its password-wrapped form is
//! ever written to the remote, inside `info.json`. The checksum lets a
//! client tell a wrong password apart from corrupted content.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{generate_random_key, unwrap_with_password, wrap_with_password, KdfParams, SymmetricKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Encryption method code written by this implementation
/// (ChaCha20-Poly1305 content, Argon2id wrapping).
pub const ENCRYPTION_METHOD: u32 = 10;

fn default_true() -> bool {
    true
}

/// A master key as stored in `info.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyEntity {
    pub id: String,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub updated_time: i64,
    #[serde(default)]
    pub source_application: String,
    pub encryption_method: u32,
    /// Hex SHA-256 of the plaintext key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    /// Password-wrapped key material.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Keys from older documents lack this flag; they count as used.
    #[serde(rename = "hasBeenUsed", default = "default_true")]
    pub has_been_used: bool,
}

impl MasterKeyEntity {
    /// Generates a new master key protected by `password`.
    ///
    /// Returns the entity to publish and the plaintext key to load locally.
    pub fn generate(
        password: &str,
        params: &KdfParams,
        source_application: &str,
    ) -> CryptoResult<(Self, SymmetricKey)> {
        let key = generate_random_key();
        let now = chrono::Utc::now().timestamp_millis();
        let entity = Self {
            id: random_id(),
            created_time: now,
            updated_time: now,
            source_application: source_application.to_string(),
            encryption_method: ENCRYPTION_METHOD,
            checksum: checksum(&key),
            content: wrap_with_password(password, params, key.as_bytes())?,
            enabled: true,
            has_been_used: false,
        };
        Ok((entity, key))
    }

    /// Unwraps the key with `password`.
    pub fn decrypt(&self, password: &str) -> CryptoResult<SymmetricKey> {
        if self.encryption_method != ENCRYPTION_METHOD {
            return Err(CryptoError::UnsupportedMethod(self.encryption_method));
        }
        let bytes = unwrap_with_password(&self.content, password).map_err(|e| match e {
            CryptoError::Decryption(_) => CryptoError::InvalidPassword(self.id.clone()),
            other => other,
        })?;
        let key = SymmetricKey::from_slice(&bytes)?;
        if checksum(&key) != self.checksum {
            return Err(CryptoError::InvalidPassword(self.id.clone()));
        }
        Ok(key)
    }

    /// Copy without key material, for logs and diagnostics.
    pub fn redacted(&self) -> Self {
        Self {
            checksum: String::new(),
            content: String::new(),
            ..self.clone()
        }
    }
}

pub(crate) fn random_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn checksum(key: &SymmetricKey) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}
