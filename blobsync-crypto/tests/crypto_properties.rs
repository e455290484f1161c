//! Property-based tests for the crypto crate.
//!
//! - Encryption is reversible with the correct key
//! - Tampering is detected
//! - Service ciphertexts decrypt with the service that produced them

use blobsync_crypto::{
    decrypt, encrypt, generate_random_key, EncryptionService, MasterKeyEncryptionService,
};
use proptest::prelude::*;

fn plaintext_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..4096)
}

proptest! {
    #[test]
    fn cipher_roundtrip(plaintext in plaintext_strategy()) {
        let key = generate_random_key();
        let encrypted = encrypt(&key, &plaintext).unwrap();
        prop_assert_eq!(decrypt(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn tampering_is_detected(plaintext in plaintext_strategy(), flip in any::<prop::sample::Index>()) {
        let key = generate_random_key();
        let mut encrypted = encrypt(&key, &plaintext).unwrap();
        let i = flip.index(encrypted.ciphertext.len());
        encrypted.ciphertext[i] ^= 0x01;
        prop_assert!(decrypt(&key, &encrypted).is_err());
    }

    #[test]
    fn service_string_roundtrip(text in ".{0,500}") {
        let service = MasterKeyEncryptionService::new();
        service.load_key("k", generate_random_key());
        service.set_active_master_key_id(Some("k".into()));
        let ciphertext = service.encrypt_string(&text).unwrap();
        prop_assert_eq!(service.decrypt_string(&ciphertext).unwrap(), text);
    }
}
