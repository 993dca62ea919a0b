//! # Shared Crypto - Validator Key Material
//!
//! **Status:** Production
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | Keccak-256 | Address derivation, message digests |
//! | `ecdsa` | secp256k1 (recoverable) | Validator identity, signature shares |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, low-S normalization (EIP-2)
//! - **Recoverable signatures**: 65-byte `r || s || v`, contract-compatible `ecrecover`
//! - **Key hygiene**: secret bytes zeroized on drop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;

// Re-exports
pub use ecdsa::{recover_signer, verify_signer, RecoverableSignature, ValidatorKeyPair};
pub use errors::CryptoError;
pub use hashing::{address_to_hex, decode_hash_hex, keccak256, Address, Hash};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
