//! # Validator Key Loading
//!
//! The node key is read from `QC_VALIDATOR_KEY` (32-byte hex, optional `0x`).
//! Without it an ephemeral key is generated, which is only useful for
//! development since the address changes on every restart.

use anyhow::{Context, Result};
use shared_crypto::{address_to_hex, ValidatorKeyPair};
use tracing::{info, warn};

/// Environment variable holding the validator private key.
pub const VALIDATOR_KEY_VAR: &str = "QC_VALIDATOR_KEY";

/// Load the validator key from the environment.
pub fn load_validator_key() -> Result<ValidatorKeyPair> {
    load_validator_key_from(|key| std::env::var(key).ok())
}

/// Load the validator key from an arbitrary lookup.
pub fn load_validator_key_from<F>(lookup: F) -> Result<ValidatorKeyPair>
where
    F: Fn(&str) -> Option<String>,
{
    let keypair = match lookup(VALIDATOR_KEY_VAR) {
        Some(hex_key) => ValidatorKeyPair::from_hex(hex_key.trim())
            .with_context(|| format!("{VALIDATOR_KEY_VAR} is not a valid secp256k1 key"))?,
        None => {
            warn!("{} not set, generating an ephemeral validator key", VALIDATOR_KEY_VAR);
            ValidatorKeyPair::generate()
        }
    };
    info!("Validator address: 0x{}", address_to_hex(&keypair.address()));
    Ok(keypair)
}

/// Optional stake to register with at startup (`QC_VALIDATOR_STAKE`).
pub fn load_stake_from<F>(lookup: F) -> Result<Option<u128>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("QC_VALIDATOR_STAKE")
        .map(|raw| {
            raw.trim()
                .parse::<u128>()
                .with_context(|| format!("QC_VALIDATOR_STAKE is not a number: {raw}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_key_from_lookup() {
        let a = load_validator_key_from(|_| Some(KEY.to_string())).unwrap();
        let b = load_validator_key_from(|_| Some(format!("0x{KEY}"))).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(load_validator_key_from(|_| Some("zz".to_string())).is_err());
    }

    #[test]
    fn test_missing_key_generates() {
        assert!(load_validator_key_from(|_| None).is_ok());
    }

    #[test]
    fn test_stake_parsing() {
        assert_eq!(load_stake_from(|_| None).unwrap(), None);
        assert_eq!(load_stake_from(|_| Some("1000".into())).unwrap(), Some(1000));
        assert!(load_stake_from(|_| Some("lots".into())).is_err());
    }
}
