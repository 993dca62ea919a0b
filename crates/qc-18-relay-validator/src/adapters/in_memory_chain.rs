//! In-Memory Validator Contract Adapter
//!
//! Implements `ChainDialer` and `ChainClient` against shared in-memory state.
//! Supports failure injection (dial failures, call failures, call latency)
//! and records every state-changing call for inspection.

use crate::domain::{RequestId, SignatureShare};
use crate::error::ChainError;
use crate::ports::{ChainClient, ChainDialer, TxHash};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_crypto::{keccak256, Address};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A recorded `submit_validation` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedValidation {
    /// Request ID.
    pub request_id: RequestId,
    /// Payment ID.
    pub payment_id: String,
    /// Submitted shares.
    pub shares: Vec<SignatureShare>,
}

#[derive(Default)]
struct ChainState {
    chain_id: u64,
    block_height: u64,
    registered: HashMap<Address, u128>,
    signatures: Vec<SignatureShare>,
    validations: Vec<SubmittedValidation>,
    failure: Option<ChainError>,
    fail_dial: bool,
    call_delay: Duration,
}

#[derive(Default)]
struct Shared {
    state: RwLock<ChainState>,
    nonce: AtomicU64,
    dials: AtomicU64,
    closes: AtomicU64,
}

/// In-memory validator contract. Clones share state.
#[derive(Clone)]
pub struct InMemoryChain {
    shared: Arc<Shared>,
}

impl InMemoryChain {
    /// Create a chain reporting `chain_id`, at block height 1.
    pub fn new(chain_id: u64) -> Self {
        let shared = Shared::default();
        {
            let mut state = shared.state.write();
            state.chain_id = chain_id;
            state.block_height = 1;
        }
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Set the reported block height.
    pub fn set_block_height(&self, height: u64) {
        self.shared.state.write().block_height = height;
    }

    /// Set the reported chain ID.
    pub fn set_chain_id(&self, chain_id: u64) {
        self.shared.state.write().chain_id = chain_id;
    }

    /// Make every subsequent call fail with `failure` (`None` to recover).
    pub fn set_failure(&self, failure: Option<ChainError>) {
        self.shared.state.write().failure = failure;
    }

    /// Make subsequent dials fail.
    pub fn set_fail_dial(&self, fail: bool) {
        self.shared.state.write().fail_dial = fail;
    }

    /// Delay every call by `delay`.
    pub fn set_call_delay(&self, delay: Duration) {
        self.shared.state.write().call_delay = delay;
    }

    /// Register `address` with `stake` directly on the contract.
    pub fn register(&self, address: Address, stake: u128) {
        self.shared.state.write().registered.insert(address, stake);
    }

    /// Stake recorded for `address`, if registered.
    pub fn stake_of(&self, address: &Address) -> Option<u128> {
        self.shared.state.read().registered.get(address).copied()
    }

    /// Every share submitted through `submit_signature`.
    pub fn submitted_signatures(&self) -> Vec<SignatureShare> {
        self.shared.state.read().signatures.clone()
    }

    /// Every call to `submit_validation`.
    pub fn submitted_validations(&self) -> Vec<SubmittedValidation> {
        self.shared.state.read().validations.clone()
    }

    /// Number of successful dials.
    pub fn dial_count(&self) -> u64 {
        self.shared.dials.load(Ordering::SeqCst)
    }

    /// Number of client handles closed.
    pub fn close_count(&self) -> u64 {
        self.shared.closes.load(Ordering::SeqCst)
    }

    fn next_tx_hash(&self, tag: &[u8]) -> TxHash {
        let nonce = self.shared.nonce.fetch_add(1, Ordering::SeqCst);
        let mut preimage = tag.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        keccak256(&preimage)
    }
}

#[async_trait]
impl ChainDialer for InMemoryChain {
    type Client = InMemoryChainClient;

    async fn dial(&self, endpoint: &str) -> Result<Self::Client, ChainError> {
        if self.shared.state.read().fail_dial {
            return Err(ChainError::Unreachable(format!("cannot dial {endpoint}")));
        }
        self.shared.dials.fetch_add(1, Ordering::SeqCst);
        debug!("[qc-18] In-memory chain dialed at {}", endpoint);

        Ok(InMemoryChainClient {
            chain: self.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Client handle onto an [`InMemoryChain`].
pub struct InMemoryChainClient {
    chain: InMemoryChain,
    closed: AtomicBool,
}

impl InMemoryChainClient {
    /// Whether `close` has been called on this handle.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), ChainError> {
        if self.is_closed() {
            return Err(ChainError::Closed);
        }
        let delay = self.chain.shared.state.read().call_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.chain.shared.state.read().failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for InMemoryChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.enter().await?;
        Ok(self.chain.shared.state.read().chain_id)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.enter().await?;
        Ok(self.chain.shared.state.read().block_height)
    }

    async fn is_registered_validator(&self, address: Address) -> Result<bool, ChainError> {
        self.enter().await?;
        Ok(self.chain.shared.state.read().registered.contains_key(&address))
    }

    async fn stake(&self, address: Address, amount: u128) -> Result<TxHash, ChainError> {
        self.enter().await?;
        *self
            .chain
            .shared
            .state
            .write()
            .registered
            .entry(address)
            .or_insert(0) += amount;
        Ok(self.chain.next_tx_hash(b"stake"))
    }

    async fn submit_signature(&self, share: &SignatureShare) -> Result<TxHash, ChainError> {
        self.enter().await?;
        self.chain.shared.state.write().signatures.push(share.clone());
        Ok(self.chain.next_tx_hash(b"signature"))
    }

    async fn submit_validation(
        &self,
        request_id: RequestId,
        payment_id: &str,
        shares: &[SignatureShare],
    ) -> Result<TxHash, ChainError> {
        self.enter().await?;
        self.chain
            .shared
            .state
            .write()
            .validations
            .push(SubmittedValidation {
                request_id,
                payment_id: payment_id.to_string(),
                shares: shares.to_vec(),
            });
        Ok(self.chain.next_tx_hash(b"validation"))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.chain.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}
