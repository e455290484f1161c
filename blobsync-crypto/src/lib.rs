//! End-to-end encryption for blobsync.
//!
//! Items and resource blobs are encrypted client-side before they reach the
//! remote. The building blocks are:
//! - Argon2id password derivation ([`derive_key`])
//! - ChaCha20-Poly1305 authenticated encryption ([`encrypt`], [`decrypt`])
//! - Master keys: random content keys wrapped by a password ([`MasterKeyEntity`])
//! - Public/private key pairs used to identify an encryption setup ([`PublicPrivateKeyPair`])
//! - The [`EncryptionService`] seam the synchronizer calls into

mod cipher;
mod error;
mod key;
mod master_key;
mod ppk;
mod service;

pub use cipher::{decrypt, decrypt_string, encrypt, encrypt_string, EncryptedData, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, generate_random_key, KdfParams, Salt, SymmetricKey, KEY_SIZE, SALT_SIZE};
pub use master_key::{MasterKeyEntity, ENCRYPTION_METHOD};
pub use ppk::{PrivateKeyBlob, PublicPrivateKeyPair};
pub use service::{EncryptionService, MasterKeyEncryptionService};
