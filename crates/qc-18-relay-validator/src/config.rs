//! # Relay Validator Configuration
//!
//! All timeouts and limits have sane defaults with override capability.
//!
//! ## Environment Variables
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `QC_RPC_ENDPOINT` | `rpc_endpoint` | `http://localhost:8545` |
//! | `QC_CHAIN_ID` | `chain_id` | `1` |
//! | `QC_VALIDATION_WINDOW_SECS` | `validation_window` | 300 |
//! | `QC_MAX_PENDING_VALIDATIONS` | `max_pending_validations` | 1000 |
//! | `QC_SIGN_REQUESTS` | `sign_requests` | `true` |
//! | `QC_THRESHOLD_PERCENT` | `threshold_percent` | 67 |
//! | `QC_HIGH_VALUE_THRESHOLD_PERCENT` | `high_value_threshold_percent` | 80 |
//! | `QC_KNOWN_VALIDATORS` | `known_validators` (comma-separated hex) | empty |
//! | `QC_RPC_TIMEOUT_SECS` | `rpc_timeout` | 10 |
//! | `QC_MAX_CLOCK_SKEW_SECS` | `max_clock_skew` | 30 |
//! | `QC_POOL_MAX_CONNS` | `pool.max_conns` | 10 |
//! | `QC_POOL_IDLE_TIMEOUT_SECS` | `pool.idle_timeout` | 300 |

use shared_crypto::Address;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Threshold percentage outside 1..=100.
    #[error("Invalid threshold percent {0}: must be within 1..=100")]
    InvalidThreshold(u8),

    /// High-value threshold weaker than the normal one.
    #[error("High-value threshold {high_value}% is below the normal threshold {normal}%")]
    WeakHighValueThreshold {
        /// High-value threshold
        high_value: u8,
        /// Normal threshold
        normal: u8,
    },

    /// A duration that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// A limit that must be positive is zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),
}

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum simultaneously checked-out connections.
    pub max_conns: usize,
    /// Maximum idle connections kept for reuse.
    pub max_idle: usize,
    /// Idle duration after which a connection is discarded.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_conns: 10,
            max_idle: 10,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Small pool for tests.
    pub fn for_testing() -> Self {
        Self {
            max_conns: 2,
            max_idle: 2,
            idle_timeout: Duration::from_secs(1),
        }
    }

    /// Validate limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_conns == 0 {
            return Err(ConfigError::ZeroLimit("pool.max_conns"));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("pool.idle_timeout"));
        }
        Ok(())
    }
}

/// Relay validator configuration.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Chain RPC endpoint dialed by the connection pool.
    pub rpc_endpoint: String,
    /// Expected chain ID of the RPC endpoint.
    pub chain_id: u64,
    /// Window added to a message timestamp to form the request deadline.
    pub validation_window: Duration,
    /// Maximum tracked requests.
    pub max_pending_validations: usize,
    /// Whether this node signs requests it receives.
    pub sign_requests: bool,
    /// Quorum percentage of known validators.
    pub threshold_percent: u8,
    /// Quorum percentage for high-value payments.
    pub high_value_threshold_percent: u8,
    /// Validator addresses whose shares are counted (own address is always added).
    pub known_validators: Vec<Address>,
    /// Expiry sweep period.
    pub cleanup_interval: Duration,
    /// Health check period.
    pub health_check_interval: Duration,
    /// Timeout applied to every chain call made by the node.
    pub rpc_timeout: Duration,
    /// How far ahead of local time a message timestamp may be.
    pub max_clock_skew: Duration,
    /// Connection pool settings.
    pub pool: PoolConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: "http://localhost:8545".to_string(),
            chain_id: 1,
            validation_window: Duration::from_secs(300),
            max_pending_validations: 1000,
            sign_requests: true,
            threshold_percent: 67,
            high_value_threshold_percent: 80,
            known_validators: Vec::new(),
            cleanup_interval: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(30),
            rpc_timeout: Duration::from_secs(10),
            max_clock_skew: Duration::from_secs(30),
            pool: PoolConfig::default(),
        }
    }
}

impl ValidatorConfig {
    /// Testing config with short intervals and a small pool.
    pub fn for_testing() -> Self {
        Self {
            chain_id: 1337,
            validation_window: Duration::from_secs(60),
            max_pending_validations: 100,
            cleanup_interval: Duration::from_millis(50),
            health_check_interval: Duration::from_millis(50),
            rpc_timeout: Duration::from_secs(1),
            pool: PoolConfig {
                max_conns: 4,
                max_idle: 4,
                idle_timeout: Duration::from_secs(5),
            },
            ..Self::default()
        }
    }

    /// Load from `QC_*` environment variables on top of the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup on top of the defaults.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("QC_RPC_ENDPOINT") {
            config.rpc_endpoint = endpoint;
        }
        if let Some(id) = parse_var(&lookup, "QC_CHAIN_ID") {
            config.chain_id = id;
        }
        if let Some(secs) = parse_var(&lookup, "QC_VALIDATION_WINDOW_SECS") {
            config.validation_window = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var(&lookup, "QC_MAX_PENDING_VALIDATIONS") {
            config.max_pending_validations = limit;
        }
        if let Some(flag) = parse_var(&lookup, "QC_SIGN_REQUESTS") {
            config.sign_requests = flag;
        }
        if let Some(pct) = parse_var(&lookup, "QC_THRESHOLD_PERCENT") {
            config.threshold_percent = pct;
        }
        if let Some(pct) = parse_var(&lookup, "QC_HIGH_VALUE_THRESHOLD_PERCENT") {
            config.high_value_threshold_percent = pct;
        }
        if let Some(list) = lookup("QC_KNOWN_VALIDATORS") {
            config.known_validators = parse_addresses(&list);
        }
        if let Some(secs) = parse_var(&lookup, "QC_RPC_TIMEOUT_SECS") {
            config.rpc_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "QC_MAX_CLOCK_SKEW_SECS") {
            config.max_clock_skew = Duration::from_secs(secs);
        }
        if let Some(max) = parse_var(&lookup, "QC_POOL_MAX_CONNS") {
            config.pool.max_conns = max;
            config.pool.max_idle = max;
        }
        if let Some(secs) = parse_var(&lookup, "QC_POOL_IDLE_TIMEOUT_SECS") {
            config.pool.idle_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.threshold_percent) {
            return Err(ConfigError::InvalidThreshold(self.threshold_percent));
        }
        if !(1..=100).contains(&self.high_value_threshold_percent) {
            return Err(ConfigError::InvalidThreshold(
                self.high_value_threshold_percent,
            ));
        }
        if self.high_value_threshold_percent < self.threshold_percent {
            return Err(ConfigError::WeakHighValueThreshold {
                high_value: self.high_value_threshold_percent,
                normal: self.threshold_percent,
            });
        }
        if self.validation_window.is_zero() {
            return Err(ConfigError::ZeroDuration("validation_window"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("cleanup_interval"));
        }
        if self.health_check_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("health_check_interval"));
        }
        if self.rpc_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("rpc_timeout"));
        }
        if self.max_pending_validations == 0 {
            return Err(ConfigError::ZeroLimit("max_pending_validations"));
        }
        self.pool.validate()
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[qc-18] Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

fn parse_addresses(list: &str) -> Vec<Address> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let hex_part = s.strip_prefix("0x").unwrap_or(s);
            match hex::decode(hex_part) {
                Ok(bytes) if bytes.len() == 20 => {
                    let mut address = [0u8; 20];
                    address.copy_from_slice(&bytes);
                    Some(address)
                }
                _ => {
                    warn!("[qc-18] Ignoring invalid validator address {:?}", s);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_is_valid() {
        assert!(ValidatorConfig::default().validate().is_ok());
        assert!(ValidatorConfig::for_testing().validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ValidatorConfig::from_lookup(lookup_from(&[
            ("QC_RPC_ENDPOINT", "http://rpc:8545"),
            ("QC_CHAIN_ID", "5"),
            ("QC_VALIDATION_WINDOW_SECS", "120"),
            ("QC_SIGN_REQUESTS", "false"),
            ("QC_POOL_MAX_CONNS", "3"),
            ("QC_MAX_CLOCK_SKEW_SECS", "5"),
        ]));

        assert_eq!(config.rpc_endpoint, "http://rpc:8545");
        assert_eq!(config.chain_id, 5);
        assert_eq!(config.validation_window, Duration::from_secs(120));
        assert!(!config.sign_requests);
        assert_eq!(config.pool.max_conns, 3);
        assert_eq!(config.pool.max_idle, 3);
        assert_eq!(config.max_clock_skew, Duration::from_secs(5));
    }

    #[test]
    fn test_unparseable_value_keeps_default() {
        let config = ValidatorConfig::from_lookup(lookup_from(&[("QC_CHAIN_ID", "mainnet")]));
        assert_eq!(config.chain_id, ValidatorConfig::default().chain_id);
    }

    #[test]
    fn test_known_validators_parsing() {
        let a = "11".repeat(20);
        let b = format!("0x{}", "22".repeat(20));
        let list = format!("{a}, {b}, not-an-address");
        let config = ValidatorConfig::from_lookup(lookup_from(&[(
            "QC_KNOWN_VALIDATORS",
            list.as_str(),
        )]));

        assert_eq!(config.known_validators, vec![[0x11u8; 20], [0x22u8; 20]]);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let config = ValidatorConfig {
            threshold_percent: 0,
            ..ValidatorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidThreshold(0)));
    }

    #[test]
    fn test_weak_high_value_threshold_rejected() {
        let config = ValidatorConfig {
            threshold_percent: 90,
            high_value_threshold_percent: 70,
            ..ValidatorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WeakHighValueThreshold { .. })
        ));
    }

    #[test]
    fn test_zero_pool_rejected() {
        let config = ValidatorConfig {
            pool: PoolConfig {
                max_conns: 0,
                ..PoolConfig::default()
            },
            ..ValidatorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLimit("pool.max_conns"))
        );
    }
}
