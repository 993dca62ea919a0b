//! # ECDSA Signatures (secp256k1, recoverable)
//!
//! Validator identity and signature shares.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//! - Signatures sign the 32-byte message hash directly (prehash), so the
//!   validator contract can `ecrecover` the same digest
//!
//! ## Wire Format
//!
//! `r (32) || s (32) || v (1)` where `v` is `27 + recovery_id`. Recovery
//! accepts both the raw (`0`/`1`) and the Ethereum (`27`/`28`) form.

use crate::hashing::{address_from_uncompressed, address_to_hex, Address, Hash};
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;
use zeroize::Zeroize;

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

/// Recoverable ECDSA signature (65 bytes, `r || s || v`).
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverableSignature(#[serde_as(as = "Bytes")] [u8; SIGNATURE_LEN]);

impl RecoverableSignature {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; SIGNATURE_LEN] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidSignatureLength {
                    expected: SIGNATURE_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Recovery byte as carried on the wire.
    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature(0x{}..)", &self.to_hex()[..16])
    }
}

/// secp256k1 validator keypair.
///
/// The address is derived once at construction.
pub struct ValidatorKeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl ValidatorKeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Create from a hex-encoded secret key (optional `0x` prefix).
    pub fn from_hex(input: &str) -> Result<Self, CryptoError> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let mut decoded =
            hex::decode(trimmed).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        if decoded.len() != 32 {
            decoded.zeroize();
            return Err(CryptoError::InvalidPrivateKey);
        }

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();

        let result = Self::from_bytes(bytes);
        bytes.zeroize();
        result
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_from_verifying_key(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Validator address derived from the public key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte message hash (deterministic RFC 6979).
    pub fn sign_hash(&self, hash: &Hash) -> Result<RecoverableSignature, CryptoError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..64].copy_from_slice(&signature.to_bytes());
        bytes[64] = 27 + recovery_id.to_byte();
        Ok(RecoverableSignature(bytes))
    }
}

impl fmt::Debug for ValidatorKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorKeyPair")
            .field("address", &address_to_hex(&self.address))
            .finish_non_exhaustive()
    }
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    address_from_uncompressed(point.as_bytes())
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, CryptoError> {
    let raw = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(CryptoError::InvalidRecoveryId(other)),
    };
    RecoveryId::from_byte(raw).ok_or(CryptoError::InvalidRecoveryId(v))
}

/// Recover the signer address of `signature` over `hash`.
pub fn recover_signer(hash: &Hash, signature: &RecoverableSignature) -> Result<Address, CryptoError> {
    let recovery_id = parse_recovery_id(signature.v())?;
    let sig = Signature::from_slice(&signature.0[..64]).map_err(|_| CryptoError::InvalidSignature)?;

    let key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(address_from_verifying_key(&key))
}

/// Check that `signature` over `hash` was produced by `expected`.
pub fn verify_signer(
    hash: &Hash,
    signature: &RecoverableSignature,
    expected: &Address,
) -> Result<(), CryptoError> {
    let recovered = recover_signer(hash, signature)?;
    if &recovered != expected {
        return Err(CryptoError::SignerMismatch {
            expected: address_to_hex(expected),
            actual: address_to_hex(&recovered),
        });
    }
    Ok(())
}
