//! Error types for the Relay Validator subsystem.

use crate::config::ConfigError;
use crate::domain::RequestId;
use shared_crypto::CryptoError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the chain RPC collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Endpoint could not be reached (dial or transport failure)
    #[error("Chain endpoint unreachable: {0}")]
    Unreachable(String),

    /// Call reached the chain but was rejected (revert, bad nonce, ...)
    #[error("Chain call rejected: {0}")]
    Rejected(String),

    /// Call did not complete within the configured RPC timeout
    #[error("Chain call '{operation}' timed out after {after:?}")]
    Timeout {
        /// Operation name
        operation: String,
        /// Elapsed timeout
        after: Duration,
    },

    /// Client handle was already closed
    #[error("Chain client closed")]
    Closed,
}

impl ChainError {
    /// Whether the failure says the underlying connection is unusable.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            ChainError::Unreachable(_) | ChainError::Timeout { .. } | ChainError::Closed
        )
    }
}

/// Connection pool errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No reusable connection and no room to dial a new one
    #[error("Connection pool exhausted: {max} connections in use")]
    Exhausted {
        /// Configured maximum
        max: usize,
    },

    /// Pool has been closed
    #[error("Connection pool closed")]
    Closed,

    /// Dialing a new connection failed
    #[error("Dial failed: {0}")]
    DialFailed(ChainError),
}

/// Outbound transport failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Transport error: {0}")]
pub struct TransportError(pub String);

/// Relay validator errors.
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// Request ID already tracked (or retired and not yet past its deadline)
    #[error("Duplicate validation request: {request_id}")]
    DuplicateRequest {
        /// Offending request ID
        request_id: RequestId,
    },

    /// Request is not tracked
    #[error("Validation request not found: {request_id}")]
    RequestNotFound {
        /// Requested ID
        request_id: RequestId,
    },

    /// Request deadline has passed
    #[error("Validation request {request_id} expired at {deadline}")]
    RequestExpired {
        /// Request ID
        request_id: RequestId,
        /// Deadline (unix seconds)
        deadline: u64,
    },

    /// Message timestamp is too far ahead of local time
    #[error("Validation request {request_id} timestamp {timestamp} is ahead of local time {now}")]
    TimestampInFuture {
        /// Request ID
        request_id: RequestId,
        /// Message timestamp (unix seconds)
        timestamp: u64,
        /// Local time (unix seconds)
        now: u64,
    },

    /// Registry is at capacity
    #[error("Too many pending validation requests (limit {limit})")]
    TooManyPendingRequests {
        /// Configured limit
        limit: usize,
    },

    /// Validator already registered
    #[error("Validator already registered")]
    AlreadyRegistered,

    /// Stake amount must be positive
    #[error("Invalid stake amount: {0}")]
    InvalidStake(u128),

    /// Message hash could not be decoded
    #[error("Invalid message hash: {0}")]
    InvalidMessageHash(CryptoError),

    /// Signing the message hash failed
    #[error("Signing failed: {0}")]
    SigningFailed(CryptoError),

    /// Signature share failed verification
    #[error("Invalid signature share for request {request_id}: {reason}")]
    InvalidShare {
        /// Request ID
        request_id: RequestId,
        /// Verification failure
        reason: String,
    },

    /// Signer is not a known validator for the request
    #[error("Unknown signer 0x{signer} for request {request_id}")]
    UnknownSigner {
        /// Request ID
        request_id: RequestId,
        /// Signer address (hex)
        signer: String,
    },

    /// Not enough signatures to submit
    #[error("Threshold not reached: {have}/{need} signatures")]
    ThresholdNotReached {
        /// Signatures collected
        have: usize,
        /// Signatures required
        need: usize,
    },

    /// Another submission for the request is in flight
    #[error("Submission already in progress for request {request_id}")]
    SubmissionInProgress {
        /// Request ID
        request_id: RequestId,
    },

    /// Chain rejected or failed the final submission
    #[error("Submission failed: {0}")]
    SubmissionFailed(ChainError),

    /// Chain reports a different chain ID than configured
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch {
        /// Configured chain ID
        expected: u64,
        /// Chain ID reported by the RPC
        actual: u64,
    },

    /// Connection pool failure
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Chain collaborator failure
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for relay validator operations
pub type ValidatorResult<T> = Result<T, ValidatorError>;
