use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::CryptoError;

/// Generate a fresh random 256-bit key for AES-256-GCM.
///
/// One key is generated per transfer on the sender and never reaches the
/// server; it travels to the recipient out-of-band (the share URL fragment
/// on the hosted path, or operator-distributed for P2P).
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encode a key to base64 for embedding in a URL fragment.
pub fn key_to_base64(key: &[u8; 32]) -> String {
    BASE64.encode(key)
}

/// Decode a base64-encoded key, rejecting anything that isn't exactly 32 bytes.
pub fn key_from_base64(encoded: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = BASE64.decode(encoded).map_err(|_| CryptoError::InvalidBase64)?;
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_base64_roundtrip() {
        let key = generate_key();
        let encoded = key_to_base64(&key);
        assert_eq!(key_from_base64(&encoded).unwrap(), key);
    }

    #[test]
    fn wrong_length_rejected() {
        let short = BASE64.encode([0u8; 16]);
        assert!(matches!(key_from_base64(&short), Err(CryptoError::InvalidKeyLength)));
    }

    #[test]
    fn keys_are_random() {
        assert_ne!(generate_key(), generate_key());
    }
}
