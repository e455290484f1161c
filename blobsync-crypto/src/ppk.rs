//! Public/private key pairs.
//!
//! A PPK identifies an encryption setup: two clients with the same PPK id
//! agree on the key material. The private half is wrapped with the master
//! password and published in `info.json` alongside the public half.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{unwrap_with_password, wrap_with_password, KdfParams, KEY_SIZE};
use crate::master_key::{random_id, ENCRYPTION_METHOD};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Wrapped private key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKeyBlob {
    pub encryption_method: u32,
    pub ciphertext: String,
}

/// Key pair as stored in `info.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPrivateKeyPair {
    pub id: String,
    /// Key size in bits.
    pub key_size: u32,
    /// Base64 X25519 public key.
    pub public_key: String,
    pub private_key: PrivateKeyBlob,
    pub created_time: i64,
}

impl PublicPrivateKeyPair {
    /// Generates a new X25519 key pair, wrapping the private key with `password`.
    pub fn generate(password: &str, params: &KdfParams) -> CryptoResult<Self> {
        let mut secret_bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut secret_bytes);
        let secret = crypto_box::SecretKey::from(secret_bytes);
        let public = secret.public_key();

        let ciphertext = wrap_with_password(password, params, &secret_bytes);
        secret_bytes.zeroize();

        Ok(Self {
            id: random_id(),
            key_size: (KEY_SIZE * 8) as u32,
            public_key: STANDARD.encode(public.as_bytes()),
            private_key: PrivateKeyBlob {
                encryption_method: ENCRYPTION_METHOD,
                ciphertext: ciphertext?,
            },
            created_time: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Decodes the public half.
    pub fn public_key(&self) -> CryptoResult<crypto_box::PublicKey> {
        let bytes = STANDARD
            .decode(&self.public_key)
            .map_err(|e| CryptoError::Decryption(format!("invalid public key: {e}")))?;
        let bytes: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            }
        })?;
        Ok(crypto_box::PublicKey::from(bytes))
    }

    /// Unwraps the private half and checks it matches the public half.
    pub fn decrypt_private_key(&self, password: &str) -> CryptoResult<crypto_box::SecretKey> {
        if self.private_key.encryption_method != ENCRYPTION_METHOD {
            return Err(CryptoError::UnsupportedMethod(self.private_key.encryption_method));
        }
        let mut bytes = unwrap_with_password(&self.private_key.ciphertext, password).map_err(|e| match e {
            CryptoError::Decryption(_) => CryptoError::InvalidPassword(self.id.clone()),
            other => other,
        })?;
        let secret_bytes: Result<[u8; KEY_SIZE], _> = bytes.as_slice().try_into();
        let actual = bytes.len();
        bytes.zeroize();
        let secret = crypto_box::SecretKey::from(secret_bytes.map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual,
        })?);
        if secret.public_key().as_bytes() != self.public_key()?.as_bytes() {
            return Err(CryptoError::InvalidPassword(self.id.clone()));
        }
        Ok(secret)
    }

    /// Copy with truncated key material, for logs and diagnostics.
    pub fn redacted(&self) -> Self {
        let ciphertext = &self.private_key.ciphertext;
        let private = if ciphertext.len() > 40 && ciphertext.is_ascii() {
            format!("{}...{}", &ciphertext[..20], &ciphertext[ciphertext.len() - 20..])
        } else {
            ciphertext.clone()
        };
        let public = match self.public_key.get(..40) {
            Some(prefix) if self.public_key.len() > 40 => format!("{prefix}..."),
            _ => self.public_key.clone(),
        };
        Self {
            public_key: public,
            private_key: PrivateKeyBlob {
                encryption_method: self.private_key.encryption_method,
                ciphertext: private,
            },
            ..self.clone()
        }
    }
}
