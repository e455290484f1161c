//! Key derivation and management.
//!
//! Uses Argon2id for deriving wrapping keys from master passwords.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of encryption keys in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// Size of salt in bytes.
pub const SALT_SIZE: usize = 16;

/// A 256-bit symmetric key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds a key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Salt for key derivation. Serialized as base64.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_SIZE],
}

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.bytes
    }
}

impl Serialize for Salt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(self.bytes))
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(&encoded).map_err(serde::de::Error::custom)?;
        let bytes: [u8; SALT_SIZE] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("salt must be 16 bytes"))?;
        Ok(Self { bytes })
    }
}

/// Argon2id parameters. Stored next to every wrapped key so that
/// derivation can be repeated on another device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Time cost (iterations).
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP recommendations for Argon2id (2023)
        Self {
            memory_cost: 19 * 1024, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use for real keys.
    pub fn insecure_fast() -> Self {
        Self {
            memory_cost: 1024, // 1 MiB
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Derives a key from a password using Argon2id.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<SymmetricKey> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(SymmetricKey::from_bytes(key_bytes))
}

/// Generates a random content key.
pub fn generate_random_key() -> SymmetricKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    SymmetricKey::from_bytes(bytes)
}

/// A secret wrapped with a password-derived key.
#[derive(Serialize, Deserialize)]
struct PasswordWrapped {
    salt: Salt,
    kdf: KdfParams,
    data: String,
}

/// Encrypts `secret` with a key derived from `password`, returning a
/// self-describing JSON string (salt and KDF parameters included).
pub(crate) fn wrap_with_password(
    password: &str,
    params: &KdfParams,
    secret: &[u8],
) -> CryptoResult<String> {
    let salt = Salt::random();
    let wrapping_key = derive_key(password, &salt, params)?;
    let data = crate::cipher::encrypt(&wrapping_key, secret)?.to_base64();
    Ok(serde_json::to_string(&PasswordWrapped {
        salt,
        kdf: params.clone(),
        data,
    })?)
}

/// Reverses [`wrap_with_password`].
pub(crate) fn unwrap_with_password(wrapped: &str, password: &str) -> CryptoResult<Vec<u8>> {
    let wrapped: PasswordWrapped = serde_json::from_str(wrapped)?;
    let wrapping_key = derive_key(password, &wrapped.salt, &wrapped.kdf)?;
    let data = crate::cipher::EncryptedData::from_base64(&wrapped.data)?;
    crate::cipher::decrypt(&wrapping_key, &data)
}
