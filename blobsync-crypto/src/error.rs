//! Error types for the encryption layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong key or tampered data.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// The password does not unlock the master key.
    #[error("invalid password for master key {0}")]
    InvalidPassword(String),

    /// Ciphertext references a master key that has not been loaded.
    #[error("master key not loaded: {0}")]
    MasterKeyNotLoaded(String),

    /// Encryption was requested with no active master key.
    #[error("no active master key")]
    NoActiveMasterKey,

    #[error("unsupported encryption method: {0}")]
    UnsupportedMethod(u32),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
