/// Dropgate crypto: AES-256-GCM envelopes, key handling, and the P2P
/// share-code generator.
///
/// The key for a transfer is generated on the sender and never reaches the
/// server; everything here operates on keys the caller already holds.
pub mod envelope;
pub mod keys;
pub mod sharecode;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("envelope too short to contain IV and tag ({len} bytes)")]
    EnvelopeTooShort { len: usize },
    #[error("GCM authentication tag did not verify")]
    TagMismatch,
    #[error("invalid base64")]
    InvalidBase64,
    #[error("decrypted filename is not valid UTF-8")]
    InvalidUtf8,
    #[error("key must decode to exactly 32 bytes")]
    InvalidKeyLength,
}
