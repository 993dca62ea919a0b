//! # Validator Identity
//!
//! Local mirror of this node's validator record. The validator contract is
//! authoritative for stake and slashing; this mirror feeds status reporting.

use crate::error::ValidatorError;
use serde::{Deserialize, Serialize};
use shared_crypto::Address;
use std::collections::HashSet;
use std::fmt;

/// Advisory health of the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidatorStatus {
    /// Node constructed, no health check has completed yet
    Starting,
    /// Last health probe reached the chain
    Healthy,
    /// Last health probe failed
    Unhealthy,
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorStatus::Starting => "starting",
            ValidatorStatus::Healthy => "healthy",
            ValidatorStatus::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

/// This node's validator record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    /// Address derived from the node key.
    pub address: Address,
    /// Locally recorded stake.
    pub stake: u128,
    /// Registration flag.
    pub is_registered: bool,
    /// Advisory health.
    pub status: ValidatorStatus,
    /// Block height seen by the last successful health probe.
    pub last_block_height: Option<u64>,
    /// Time of the last health probe (unix seconds).
    pub last_health_check: Option<u64>,
}

impl Validator {
    /// Create an unregistered validator in `Starting` status.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            stake: 0,
            is_registered: false,
            status: ValidatorStatus::Starting,
            last_block_height: None,
            last_health_check: None,
        }
    }

    /// Record a registration with `stake`.
    pub fn register(&mut self, stake: u128) -> Result<(), ValidatorError> {
        if self.is_registered {
            return Err(ValidatorError::AlreadyRegistered);
        }
        if stake == 0 {
            return Err(ValidatorError::InvalidStake(stake));
        }
        self.is_registered = true;
        self.stake = stake;
        Ok(())
    }

    /// Record a successful health probe. Returns the previous status.
    pub fn mark_healthy(&mut self, block_height: u64, now: u64) -> ValidatorStatus {
        let previous = self.status;
        self.status = ValidatorStatus::Healthy;
        self.last_block_height = Some(block_height);
        self.last_health_check = Some(now);
        previous
    }

    /// Record a failed health probe. Returns the previous status.
    pub fn mark_unhealthy(&mut self, now: u64) -> ValidatorStatus {
        let previous = self.status;
        self.status = ValidatorStatus::Unhealthy;
        self.last_health_check = Some(now);
        previous
    }
}

/// Addresses whose signature shares count toward a request's threshold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    members: HashSet<Address>,
}

impl ValidatorSet {
    /// Build from addresses; duplicates collapse.
    pub fn new<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = Address>,
    {
        Self {
            members: addresses.into_iter().collect(),
        }
    }

    /// Whether `address` is a member.
    pub fn contains(&self, address: &Address) -> bool {
        self.members.contains(address)
    }

    /// Number of distinct members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Iterate members.
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }
}
