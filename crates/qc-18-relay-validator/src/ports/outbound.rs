//! # Outbound Ports
//!
//! Traits for the node's external collaborators: the chain RPC (validator
//! contract), the peer-to-peer transport and the clock.

use crate::domain::{RequestId, SignatureShare, ValidationMessage};
use crate::error::{ChainError, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_crypto::{Address, Hash};

/// Transaction hash returned by state-changing chain calls.
pub type TxHash = Hash;

/// Chain RPC client bound to the validator contract - outbound port.
///
/// Handles are shared through the connection pool, so every method takes `&self`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain ID reported by the endpoint.
    async fn chain_id(&self) -> Result<u64, ChainError>;

    /// Current block height.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Whether `address` is registered with the validator contract.
    async fn is_registered_validator(&self, address: Address) -> Result<bool, ChainError>;

    /// Stake `amount` for `address`.
    async fn stake(&self, address: Address, amount: u128) -> Result<TxHash, ChainError>;

    /// Submit one validator's signature share.
    async fn submit_signature(&self, share: &SignatureShare) -> Result<TxHash, ChainError>;

    /// Submit the collected shares for final aggregation.
    async fn submit_validation(
        &self,
        request_id: RequestId,
        payment_id: &str,
        shares: &[SignatureShare],
    ) -> Result<TxHash, ChainError>;

    /// Release the underlying connection. Must be idempotent.
    fn close(&self);
}

/// Opens chain clients for an endpoint - outbound port.
#[async_trait]
pub trait ChainDialer: Send + Sync + 'static {
    /// Client type produced by this dialer.
    type Client: ChainClient + 'static;

    /// Dial `endpoint`.
    async fn dial(&self, endpoint: &str) -> Result<Self::Client, ChainError>;
}

/// Outbound side of the P2P transport - outbound port.
#[async_trait]
pub trait SignatureTransport: Send + Sync {
    /// Push a signature share to the other validators.
    async fn broadcast_share(&self, share: &SignatureShare) -> Result<(), TransportError>;
}

/// Unix-seconds clock - outbound port.
pub trait TimeSource: Send + Sync {
    /// Current time (unix seconds).
    fn now(&self) -> u64;
}

/// Message delivered by the inbound side of the P2P transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundMessage {
    /// New payment to validate
    ValidationRequest(ValidationMessage),
    /// Another validator's signature share
    SignatureShare(SignatureShare),
}
