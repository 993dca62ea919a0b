//! # Validation Requests
//!
//! A validation request is the tracked unit of work for one payment awaiting
//! independent confirmation by the relay validators.

use serde::{Deserialize, Serialize};
use shared_crypto::{Address, RecoverableSignature};
use std::fmt;
use std::time::Duration;

/// Request identifier assigned by the payment platform.
pub type RequestId = u64;

/// Inbound validation message delivered by the P2P transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    /// Unique request ID.
    pub request_id: RequestId,
    /// Payment this request validates.
    pub payment_id: String,
    /// Hex message hash to sign (32 bytes, optional `0x`).
    pub message_hash: String,
    /// Creation time (unix seconds).
    pub timestamp: u64,
    /// High-value payments need a stronger quorum.
    #[serde(default)]
    pub high_value: bool,
}

/// One validator's attestation for a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShare {
    /// Request the share belongs to.
    pub request_id: RequestId,
    /// Claimed signer.
    pub signer: Address,
    /// Recoverable signature over the request's message hash.
    pub signature: RecoverableSignature,
}

/// Tracked validation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationRequest {
    /// Unique request ID.
    pub request_id: RequestId,
    /// Associated payment.
    pub payment_id: String,
    /// Hex message hash as received.
    pub message_hash: String,
    /// Distinct signatures needed.
    pub required_signatures: usize,
    /// Absolute deadline (unix seconds).
    pub deadline: u64,
    /// High-value flag.
    pub high_value: bool,
    /// Time the request was first tracked (unix seconds).
    pub created_at: u64,
}

impl ValidationRequest {
    /// Build from a message: deadline is `timestamp + window`.
    pub fn from_message(
        message: &ValidationMessage,
        required_signatures: usize,
        window: Duration,
        now: u64,
    ) -> Self {
        Self {
            request_id: message.request_id,
            payment_id: message.payment_id.clone(),
            message_hash: message.message_hash.clone(),
            required_signatures,
            deadline: message.timestamp.saturating_add(window.as_secs()),
            high_value: message.high_value,
            created_at: now,
        }
    }

    /// Whether the deadline has been reached.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.deadline
    }

    /// State derived from the signature count at `now`.
    pub fn state_at(&self, signature_count: usize, now: u64) -> RequestState {
        if self.is_expired(now) {
            RequestState::Expired
        } else if signature_count >= self.required_signatures {
            RequestState::ThresholdReached
        } else {
            RequestState::Pending
        }
    }
}

/// Request lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Collecting signatures
    Pending,
    /// Enough distinct signatures collected
    ThresholdReached,
    /// Accepted by the validator contract (terminal)
    Submitted,
    /// Deadline passed (terminal)
    Expired,
}

impl RequestState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Submitted | RequestState::Expired)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Pending => "pending",
            RequestState::ThresholdReached => "threshold-reached",
            RequestState::Submitted => "submitted",
            RequestState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Read model returned by status queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// Request ID.
    pub request_id: RequestId,
    /// Associated payment.
    pub payment_id: String,
    /// Current state.
    pub state: RequestState,
    /// Distinct signatures recorded.
    pub signature_count: usize,
    /// Distinct signatures required.
    pub required_signatures: usize,
    /// Absolute deadline (unix seconds).
    pub deadline: u64,
    /// High-value flag.
    pub high_value: bool,
}

/// Signatures needed for `threshold_percent` of `validator_count`, rounded up.
///
/// Never below one, never above the validator count (when non-empty).
pub fn required_signatures(validator_count: usize, threshold_percent: u8) -> usize {
    let pct = usize::from(threshold_percent.min(100));
    let required = (validator_count * pct).div_ceil(100);
    required.max(1)
}
