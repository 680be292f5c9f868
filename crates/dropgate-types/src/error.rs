use thiserror::Error;

/// Crate-wide error taxonomy (spec §7). Every fallible operation in the
/// engines resolves to one of these variants so callers (CLI exit codes,
/// retry loops, UI layers) can match on category rather than parse strings.
#[derive(Debug, Error)]
pub enum DropgateError {
    /// Malformed input: bad filename, bad lifetime, bad offset, invalid code.
    /// Surfaced to the caller; never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport failure, timeout, peer disconnect. Retried by upload chunks;
    /// fatal for an in-flight P2P transfer.
    #[error("network error: {0}")]
    Network(String),

    /// Server returned an unexpected shape, version mismatch, sequence gap,
    /// or unexpected message. Always fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// GCM tag mismatch, missing key, or too-short blob.
    #[error("crypto error: {0}")]
    Crypto(#[from] dropgate_crypto::CryptoError),

    /// The caller cancelled via a cancellation signal. Terminal, and not
    /// reported to the user as a failure.
    #[error("aborted")]
    Abort,

    /// A specific deadline elapsed. Upload chunk callers may convert this to
    /// `Network` to make it eligible for retry.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl DropgateError {
    /// Whether an upload chunk should retry after this error (spec §4.2
    /// point 6: network errors, 5xx, and timeouts are retriable; 4xx is not).
    pub fn is_retriable(&self) -> bool {
        matches!(self, DropgateError::Network(_) | DropgateError::Timeout(_))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DropgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_and_timeout_are_retriable() {
        assert!(DropgateError::network("boom").is_retriable());
        assert!(DropgateError::timeout("boom").is_retriable());
    }

    #[test]
    fn validation_protocol_crypto_abort_are_not_retriable() {
        assert!(!DropgateError::validation("bad input").is_retriable());
        assert!(!DropgateError::protocol("bad shape").is_retriable());
        assert!(!DropgateError::Abort.is_retriable());
        assert!(!DropgateError::from(dropgate_crypto::CryptoError::TagMismatch).is_retriable());
    }
}
