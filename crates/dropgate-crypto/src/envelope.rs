use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::CryptoError;

/// Nonce length in bytes, prepended to every envelope.
pub const IV_LEN: usize = 12;
/// GCM authentication tag length in bytes, appended by the cipher.
pub const TAG_LEN: usize = 16;
/// Minimum valid envelope length: an empty plaintext still carries IV + tag.
pub const MIN_ENVELOPE_LEN: usize = IV_LEN + TAG_LEN;

/// Encrypt `plaintext` with AES-256-GCM, no AAD, and return
/// `IV(12) || ciphertext || tag(16)`.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    // Only fails if the plaintext exceeds GCM's per-key message limit, which
    // is far beyond any chunk size this system uses.
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .expect("AES-256-GCM encryption of a bounded chunk cannot fail");

    let mut envelope = Vec::with_capacity(IV_LEN + ciphertext.len());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// Decrypt an envelope produced by [`encrypt`]. Fails with [`CryptoError`] if
/// the blob is too short to contain an IV and tag, or if the GCM tag doesn't
/// verify (wrong key or tampered ciphertext).
pub fn decrypt(blob: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::EnvelopeTooShort { len: blob.len() });
    }

    let (iv, ciphertext) = blob.split_at(IV_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::TagMismatch)
}

/// Encrypt a filename: UTF-8 encode, envelope-encrypt, base64-encode.
pub fn encrypt_filename(name: &str, key: &[u8; 32]) -> String {
    BASE64.encode(encrypt(name.as_bytes(), key))
}

/// Decrypt a base64-wrapped filename envelope back to a UTF-8 string.
pub fn decrypt_filename(b64: &str, key: &[u8; 32]) -> Result<String, CryptoError> {
    let blob = BASE64
        .decode(b64)
        .map_err(|_| CryptoError::InvalidBase64)?;
    let plaintext = decrypt(&blob, key)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_key;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = generate_key();
        let message = b"Hello from Dropgate!";

        let envelope = encrypt(message, &key);
        assert_ne!(&envelope[IV_LEN..], message.as_slice());

        let decrypted = decrypt(&envelope, &key).unwrap();
        assert_eq!(decrypted, message);
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let key = generate_key();
        let envelope = encrypt(b"", &key);
        assert_eq!(envelope.len(), MIN_ENVELOPE_LEN);
        assert_eq!(decrypt(&envelope, &key).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn wrong_key_fails() {
        let key1 = generate_key();
        let key2 = generate_key();
        let message = b"Secret message";

        let envelope = encrypt(message, &key1);
        let result = decrypt(&envelope, &key2);
        assert!(matches!(result, Err(CryptoError::TagMismatch)));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = generate_key();
        let mut envelope = encrypt(b"tamper with me", &key);
        let last = envelope.len() - 1;
        envelope[last] ^= 0xFF;
        assert!(matches!(decrypt(&envelope, &key), Err(CryptoError::TagMismatch)));
    }

    #[test]
    fn short_blob_rejected() {
        let key = generate_key();
        let short = vec![0u8; MIN_ENVELOPE_LEN - 1];
        assert!(matches!(
            decrypt(&short, &key),
            Err(CryptoError::EnvelopeTooShort { .. })
        ));
    }

    #[test]
    fn filename_roundtrip() {
        let key = generate_key();
        let name = "secret.dat";
        let ciphertext = encrypt_filename(name, &key);
        assert_ne!(ciphertext, name);
        assert_eq!(decrypt_filename(&ciphertext, &key).unwrap(), name);
    }
}
