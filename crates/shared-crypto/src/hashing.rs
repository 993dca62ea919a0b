//! # Keccak-256 Hashing
//!
//! Address derivation and message-hash decoding shared by every validator.
//!
//! Addresses follow the Ethereum convention: the last 20 bytes of
//! `keccak256(uncompressed_pubkey[1..])`.

use crate::CryptoError;
use sha3::{Digest, Keccak256};

/// 32-byte digest.
pub type Hash = [u8; 32];

/// 20-byte validator address.
pub type Address = [u8; 20];

/// Hash data with Keccak-256 (one-shot).
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derive an address from a 65-byte uncompressed SEC1 public key.
pub(crate) fn address_from_uncompressed(pubkey: &[u8]) -> Address {
    // Skip the 0x04 tag byte
    let digest = keccak256(&pubkey[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Decode a hex message hash (optional `0x` prefix) into exactly 32 bytes.
pub fn decode_hash_hex(input: &str) -> Result<Hash, CryptoError> {
    let trimmed = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    let bytes = hex::decode(trimmed).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidHashLength {
            expected: 32,
            actual: bytes.len(),
        });
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

/// Lowercase hex rendering of an address, without prefix.
pub fn address_to_hex(address: &Address) -> String {
    hex::encode(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        // Well-known keccak256("") digest
        let expected =
            hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
                .unwrap();
        assert_eq!(keccak256(b"").to_vec(), expected);
    }

    #[test]
    fn test_decode_hash_with_prefix() {
        let hex_hash = format!("0x{}", "ab".repeat(32));
        let hash = decode_hash_hex(&hex_hash).unwrap();
        assert_eq!(hash, [0xABu8; 32]);
    }

    #[test]
    fn test_decode_hash_without_prefix() {
        let hash = decode_hash_hex(&"01".repeat(32)).unwrap();
        assert_eq!(hash, [0x01u8; 32]);
    }

    #[test]
    fn test_decode_hash_wrong_length() {
        let result = decode_hash_hex(&"01".repeat(31));
        assert_eq!(
            result,
            Err(CryptoError::InvalidHashLength {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_decode_hash_not_hex() {
        assert!(matches!(
            decode_hash_hex("0xnothex"),
            Err(CryptoError::InvalidHex(_))
        ));
    }
}
