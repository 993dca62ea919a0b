//! Crypto error types.

use thiserror::Error;

/// Cryptographic operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hex encoding
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Invalid hash length
    #[error("Invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength {
        /// Expected hash length in bytes
        expected: usize,
        /// Actual hash length in bytes
        actual: usize,
    },

    /// Invalid signature length
    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength {
        /// Expected signature length in bytes
        expected: usize,
        /// Actual signature length in bytes
        actual: usize,
    },

    /// Invalid recovery id
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Invalid private key
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Public key recovery failed
    #[error("Public key recovery failed")]
    RecoveryFailed,

    /// Recovered signer does not match the claimed one
    #[error("Signer mismatch: expected 0x{expected}, recovered 0x{actual}")]
    SignerMismatch {
        /// Claimed signer (hex)
        expected: String,
        /// Recovered signer (hex)
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_length_error_message() {
        let err = CryptoError::InvalidHashLength {
            expected: 32,
            actual: 31,
        };
        assert!(err.to_string().contains("expected 32, got 31"));
    }

    #[test]
    fn test_signer_mismatch_message() {
        let err = CryptoError::SignerMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(err.to_string().contains("0xaa"));
        assert!(err.to_string().contains("0xbb"));
    }
}
