//! # Validator Node Service
//!
//! Orchestrates registration, request intake, signing, signature-share
//! tallying and final submission. Owns the request registry and the chain
//! connection pool.
//!
//! Every chain call goes through [`ValidatorNode::with_chain`]: a pooled
//! connection is checked out, the call runs under `rpc_timeout`, and the
//! connection is returned (or discarded on a connection fault).

use crate::config::ValidatorConfig;
use crate::domain::{
    required_signatures, RequestId, RequestRegistry, RequestState, RequestStatus,
    SignatureOutcome, SignatureShare, ValidationMessage, ValidationRequest, Validator,
    ValidatorSet, ValidatorStatus,
};
use crate::error::{ChainError, PoolError, ValidatorError, ValidatorResult};
use crate::metrics;
use crate::monitor;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::ports::{
    ChainClient, ChainDialer, InboundMessage, SignatureTransport, TimeSource, TxHash,
    ValidatorApi,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_crypto::{address_to_hex, decode_hash_hex, verify_signer, Address, ValidatorKeyPair};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};


/// Result of a successful `submit_validation`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Submitted request.
    pub request_id: RequestId,
    /// Associated payment.
    pub payment_id: String,
    /// Transaction hash reported by the contract.
    pub tx_hash: TxHash,
    /// Shares included in the submission.
    pub signature_count: usize,
    /// Always `Submitted`.
    pub state: RequestState,
}

/// Relay validator node.
///
/// Cheap to clone: every field is shared, so background tasks and signing
/// tasks hold their own handle onto the same node.
pub struct ValidatorNode<D: ChainDialer> {
    config: Arc<ValidatorConfig>,
    keypair: Arc<ValidatorKeyPair>,
    validator: Arc<RwLock<Validator>>,
    validator_set: Arc<ValidatorSet>,
    registry: Arc<RequestRegistry>,
    pool: Arc<ConnectionPool<D>>,
    transport: Arc<dyn SignatureTransport>,
    clock: Arc<dyn TimeSource>,
    started: Arc<AtomicBool>,
    required: usize,
    high_value_required: usize,
}

impl<D: ChainDialer> Clone for ValidatorNode<D> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            keypair: Arc::clone(&self.keypair),
            validator: Arc::clone(&self.validator),
            validator_set: Arc::clone(&self.validator_set),
            registry: Arc::clone(&self.registry),
            pool: Arc::clone(&self.pool),
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            started: Arc::clone(&self.started),
            required: self.required,
            high_value_required: self.high_value_required,
        }
    }
}

impl<D: ChainDialer> ValidatorNode<D> {
    /// Create a node. Nothing is dialed until [`start`](Self::start).
    ///
    /// The validator set is `config.known_validators` plus this node's own
    /// address.
    pub fn new(
        config: ValidatorConfig,
        keypair: ValidatorKeyPair,
        dialer: D,
        transport: Arc<dyn SignatureTransport>,
        clock: Arc<dyn TimeSource>,
    ) -> ValidatorResult<Self> {
        config.validate()?;

        let address = keypair.address();
        let validator_set = ValidatorSet::new(
            config
                .known_validators
                .iter()
                .copied()
                .chain(std::iter::once(address)),
        );
        let required = required_signatures(validator_set.len(), config.threshold_percent);
        let high_value_required =
            required_signatures(validator_set.len(), config.high_value_threshold_percent);

        info!(
            "[qc-18] Validator 0x{} with {} known validators (threshold {}, high-value {})",
            address_to_hex(&address),
            validator_set.len(),
            required,
            high_value_required
        );

        let pool = ConnectionPool::new(dialer, config.rpc_endpoint.clone(), config.pool.clone());

        Ok(Self {
            registry: Arc::new(RequestRegistry::with_capacity(config.max_pending_validations)),
            config: Arc::new(config),
            keypair: Arc::new(keypair),
            validator: Arc::new(RwLock::new(Validator::new(address))),
            validator_set: Arc::new(validator_set),
            pool: Arc::new(pool),
            transport,
            clock,
            started: Arc::new(AtomicBool::new(false)),
            required,
            high_value_required,
        })
    }

    /// Connect to the chain, verify its chain ID, read the on-chain
    /// registration and launch the background loops.
    ///
    /// Returns the handles of the expiry, health and pool cleanup loops; all
    /// of them stop when `shutdown` flips to `true`. A second call on a
    /// started node is a no-op and returns no handles.
    pub async fn start(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> ValidatorResult<Vec<JoinHandle<()>>> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("[qc-18] Validator node already started");
            return Ok(Vec::new());
        }

        if let Err(err) = self.verify_chain().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(err);
        }

        match self.sync_registration().await {
            Ok(registered) => info!(registered, "[qc-18] On-chain registration loaded"),
            Err(err) => warn!(
                "[qc-18] Could not read on-chain registration, continuing unregistered: {}",
                err
            ),
        }

        let handles = vec![
            tokio::spawn(monitor::run_expiry_loop(
                self.clone(),
                self.config.cleanup_interval,
                shutdown.clone(),
            )),
            tokio::spawn(monitor::run_health_loop(
                self.clone(),
                self.config.health_check_interval,
                shutdown.clone(),
            )),
            self.pool.start_cleanup(shutdown),
        ];

        info!(
            "[qc-18] Validator node started on chain {} via {}",
            self.config.chain_id,
            self.pool.endpoint()
        );
        Ok(handles)
    }

    async fn verify_chain(&self) -> ValidatorResult<()> {
        let actual = self
            .with_chain("chain_id", |client| async move { client.chain_id().await })
            .await?;
        if actual != self.config.chain_id {
            return Err(ValidatorError::ChainIdMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// Register this node with `stake`.
    ///
    /// Local bookkeeping is updated first; a failing on-chain stake call is
    /// logged and does not roll it back.
    pub async fn register_validator(&self, stake: u128) -> ValidatorResult<()> {
        self.validator.write().register(stake)?;
        let address = self.address();
        info!("[qc-18] Registered validator 0x{} with stake {}", address_to_hex(&address), stake);

        let result = self
            .with_chain("stake", move |client| async move {
                client.stake(address, stake).await
            })
            .await;
        match result {
            Ok(tx_hash) => debug!("[qc-18] Stake transaction 0x{}", hex::encode(tx_hash)),
            Err(err) => warn!("[qc-18] Stake submission failed: {}", err),
        }
        Ok(())
    }

    /// Track a new validation request and spawn its signing task.
    ///
    /// Rejects duplicates (including recently submitted IDs), messages whose
    /// deadline has already passed, timestamps further ahead than
    /// `max_clock_skew`, and requests beyond the pending limit.
    pub fn process_validation_request(&self, message: ValidationMessage) -> ValidatorResult<()> {
        let now = self.clock.now();
        if message.timestamp > now.saturating_add(self.config.max_clock_skew.as_secs()) {
            let err = ValidatorError::TimestampInFuture {
                request_id: message.request_id,
                timestamp: message.timestamp,
                now,
            };
            metrics::record_request_rejected(rejection_reason(&err));
            debug!(request_id = message.request_id, "[qc-18] Request rejected: {}", err);
            return Err(err);
        }

        let required = if message.high_value {
            self.high_value_required
        } else {
            self.required
        };
        let request = ValidationRequest::from_message(
            &message,
            required,
            self.config.validation_window,
            now,
        );

        if let Err(err) = self
            .registry
            .create(request, Arc::clone(&self.validator_set), now)
        {
            metrics::record_request_rejected(rejection_reason(&err));
            debug!(request_id = message.request_id, "[qc-18] Request rejected: {}", err);
            return Err(err);
        }

        metrics::record_request_accepted();
        metrics::set_pending_requests(self.registry.len());
        info!(
            request_id = message.request_id,
            payment_id = %message.payment_id,
            high_value = message.high_value,
            "[qc-18] Tracking validation request ({} signatures required)",
            required
        );

        if self.config.sign_requests {
            self.spawn_signing(message.request_id);
        }
        Ok(())
    }

    fn spawn_signing(&self, request_id: RequestId) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let node = self.clone();
                handle.spawn(async move { node.sign_validation_request(request_id).await });
            }
            Err(_) => warn!(request_id, "[qc-18] No async runtime, request left unsigned"),
        }
    }

    /// Sign a tracked request, record the own share and push it out.
    ///
    /// Failures are logged only. A request pruned in the meantime is not
    /// recreated.
    async fn sign_validation_request(&self, request_id: RequestId) {
        let Some(message_hash) = self.registry.message_hash(request_id) else {
            debug!(request_id, "[qc-18] Request gone before signing");
            return;
        };

        let share = match self.sign_share(request_id, &message_hash) {
            Ok(share) => share,
            Err(err) => {
                warn!(request_id, "[qc-18] Signing failed: {}", err);
                return;
            }
        };

        match self.registry.add_signature(&share, self.clock.now()) {
            Ok(outcome) => {
                metrics::record_signature("own");
                debug!(
                    request_id,
                    "[qc-18] Own signature recorded ({}/{})",
                    outcome.count(),
                    self.registry
                        .status(request_id, self.clock.now())
                        .map(|s| s.required_signatures)
                        .unwrap_or_default()
                );
            }
            Err(err) => {
                debug!(request_id, "[qc-18] Own signature not recorded: {}", err);
                return;
            }
        }

        if let Err(err) = self.transport.broadcast_share(&share).await {
            warn!(request_id, "[qc-18] Broadcasting signature share failed: {}", err);
        }

        let result = self
            .with_chain("submit_signature", move |client| async move {
                client.submit_signature(&share).await
            })
            .await;
        if let Err(err) = result {
            warn!(request_id, "[qc-18] Signature submission failed: {}", err);
        }
    }

    fn sign_share(&self, request_id: RequestId, message_hash: &str) -> ValidatorResult<SignatureShare> {
        let hash = decode_hash_hex(message_hash).map_err(ValidatorError::InvalidMessageHash)?;
        let signature = self
            .keypair
            .sign_hash(&hash)
            .map_err(ValidatorError::SigningFailed)?;
        Ok(SignatureShare {
            request_id,
            signer: self.keypair.address(),
            signature,
        })
    }

    /// Verify and record another validator's signature share.
    ///
    /// The signature must recover to `share.signer` over the request's
    /// message hash, and the signer must belong to the validator set.
    pub fn process_signature_share(&self, share: SignatureShare) -> ValidatorResult<SignatureOutcome> {
        let request_id = share.request_id;
        let message_hash = self
            .registry
            .message_hash(request_id)
            .ok_or(ValidatorError::RequestNotFound { request_id })?;

        let hash = decode_hash_hex(&message_hash).map_err(|err| ValidatorError::InvalidShare {
            request_id,
            reason: err.to_string(),
        })?;
        verify_signer(&hash, &share.signature, &share.signer).map_err(|err| {
            ValidatorError::InvalidShare {
                request_id,
                reason: err.to_string(),
            }
        })?;

        let outcome = self.registry.add_signature(&share, self.clock.now())?;
        metrics::record_signature("peer");

        if outcome.threshold_reached() {
            info!(
                request_id,
                "[qc-18] Threshold reached with {} signatures",
                outcome.count()
            );
        } else {
            debug!(
                request_id,
                signer = %address_to_hex(&share.signer),
                "[qc-18] Signature share recorded ({} total)",
                outcome.count()
            );
        }
        Ok(outcome)
    }

    /// Submit a threshold-reached request to the validator contract.
    ///
    /// One best-effort attempt. Success retires the request; failure leaves
    /// it pending and returns `SubmissionFailed`.
    pub async fn submit_validation(&self, request_id: RequestId) -> ValidatorResult<SubmissionReceipt> {
        let (status, shares) = self
            .registry
            .claim_for_submission(request_id, self.clock.now())?;
        let mut claim = SubmissionClaim {
            registry: &self.registry,
            request_id,
            armed: true,
        };
        let payment_id = status.payment_id.clone();

        let result = self
            .with_chain("submit_validation", move |client| async move {
                client
                    .submit_validation(request_id, &payment_id, &shares)
                    .await
            })
            .await;

        match result {
            Ok(tx_hash) => {
                self.registry.retire(request_id);
                claim.armed = false;
                metrics::record_request_submitted();
                metrics::set_pending_requests(self.registry.len());
                info!(
                    request_id,
                    payment_id = %status.payment_id,
                    "[qc-18] Validation submitted with {} signatures (tx 0x{})",
                    status.signature_count,
                    hex::encode(tx_hash)
                );
                Ok(SubmissionReceipt {
                    request_id,
                    payment_id: status.payment_id,
                    tx_hash,
                    signature_count: status.signature_count,
                    state: RequestState::Submitted,
                })
            }
            Err(err) => {
                drop(claim);
                warn!(request_id, "[qc-18] Validation submission failed: {}", err);
                Err(match err {
                    ValidatorError::Chain(chain_err) => ValidatorError::SubmissionFailed(chain_err),
                    other => other,
                })
            }
        }
    }

    /// IDs of requests that have reached their threshold and can be submitted.
    pub fn ready_for_submission(&self) -> Vec<RequestId> {
        self.registry.ready_for_submission(self.clock.now())
    }

    /// Prune every request whose deadline has passed. Returns the number removed.
    pub fn cleanup_expired_requests(&self) -> usize {
        let removed = self.registry.prune_expired(self.clock.now());
        if !removed.is_empty() {
            info!(count = removed.len(), "[qc-18] Pruned expired validation requests");
            metrics::record_requests_expired(removed.len() as u64);
        }
        metrics::set_pending_requests(self.registry.len());
        removed.len()
    }

    /// Probe the chain for its block height and update the advisory status.
    ///
    /// An exhausted pool says nothing about the chain, so the previous
    /// status is kept.
    pub async fn perform_health_check(&self) -> ValidatorStatus {
        let now = self.clock.now();
        let result = self
            .with_chain("block_number", |client| async move { client.block_number().await })
            .await;

        match result {
            Ok(height) => {
                let previous = self.validator.write().mark_healthy(height, now);
                if previous != ValidatorStatus::Healthy {
                    info!("[qc-18] Validator healthy at block {}", height);
                }
                metrics::set_healthy(true);
                ValidatorStatus::Healthy
            }
            Err(ValidatorError::Pool(PoolError::Exhausted { max })) => {
                debug!("[qc-18] Health check skipped, all {} connections busy", max);
                self.status()
            }
            Err(err) => {
                let previous = self.validator.write().mark_unhealthy(now);
                if previous != ValidatorStatus::Unhealthy {
                    warn!("[qc-18] Validator unhealthy: {}", err);
                }
                metrics::set_healthy(false);
                ValidatorStatus::Unhealthy
            }
        }
    }

    /// Read the registration flag from the contract and overwrite the local mirror.
    pub async fn sync_registration(&self) -> ValidatorResult<bool> {
        let address = self.address();
        let registered = self
            .with_chain("is_registered_validator", move |client| async move {
                client.is_registered_validator(address).await
            })
            .await?;
        self.validator.write().is_registered = registered;
        Ok(registered)
    }

    /// Consume transport messages until the channel closes or shutdown fires.
    ///
    /// Per-message errors are logged and do not stop the loop.
    pub async fn run_transport(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            return;
        }

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(InboundMessage::ValidationRequest(message)) => {
                        let request_id = message.request_id;
                        if let Err(err) = self.process_validation_request(message) {
                            debug!(request_id, "[qc-18] Dropped validation request: {}", err);
                        }
                    }
                    Some(InboundMessage::SignatureShare(share)) => {
                        let request_id = share.request_id;
                        if let Err(err) = self.process_signature_share(share) {
                            debug!(request_id, "[qc-18] Dropped signature share: {}", err);
                        }
                    }
                    None => {
                        info!("[qc-18] Inbound transport closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Status of a tracked request.
    pub fn get_validation_status(&self, request_id: RequestId) -> Option<RequestStatus> {
        self.registry.status(request_id, self.clock.now())
    }

    /// Collected shares of a tracked request, ordered by signer.
    pub fn get_signatures(&self, request_id: RequestId) -> Option<Vec<SignatureShare>> {
        self.registry.signatures(request_id)
    }

    /// Number of tracked requests.
    pub fn get_pending_validation_count(&self) -> usize {
        self.registry.len()
    }

    /// Snapshot of this node's validator record.
    pub fn validator(&self) -> Validator {
        self.validator.read().clone()
    }

    /// Advisory health.
    pub fn status(&self) -> ValidatorStatus {
        self.validator.read().status
    }

    /// This node's validator address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Validator set used for new requests.
    pub fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    /// Node configuration.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Chain connection pool.
    pub fn pool(&self) -> &Arc<ConnectionPool<D>> {
        &self.pool
    }

    /// Whether `start` has completed its chain check.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run `call` on a pooled connection under the RPC timeout.
    async fn with_chain<T, F, Fut>(&self, operation: &'static str, call: F) -> ValidatorResult<T>
    where
        F: FnOnce(Arc<D::Client>) -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let conn = self.pool.get().await?;
        let client = Arc::clone(conn.client());
        let checkout = Checkout {
            pool: &self.pool,
            conn: Some(conn),
        };

        match tokio::time::timeout(self.config.rpc_timeout, call(client)).await {
            Ok(Ok(value)) => {
                checkout.put();
                Ok(value)
            }
            Ok(Err(err)) => {
                if !err.is_connection_fault() {
                    checkout.put();
                }
                metrics::record_chain_failure(operation);
                Err(err.into())
            }
            Err(_) => {
                drop(checkout);
                metrics::record_chain_failure(operation);
                Err(ChainError::Timeout {
                    operation: operation.to_string(),
                    after: self.config.rpc_timeout,
                }
                .into())
            }
        }
    }
}

/// Claimed submission; released again unless the request was retired.
struct SubmissionClaim<'a> {
    registry: &'a RequestRegistry,
    request_id: RequestId,
    armed: bool,
}

impl Drop for SubmissionClaim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release_submission(self.request_id);
        }
    }
}

/// Checked-out connection; discarded on drop unless returned with `put`.
struct Checkout<'a, D: ChainDialer> {
    pool: &'a ConnectionPool<D>,
    conn: Option<PooledConnection<D::Client>>,
}

impl<D: ChainDialer> Checkout<'_, D> {
    fn put(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

impl<D: ChainDialer> Drop for Checkout<'_, D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

fn rejection_reason(err: &ValidatorError) -> &'static str {
    match err {
        ValidatorError::DuplicateRequest { .. } => "duplicate",
        ValidatorError::RequestExpired { .. } => "expired",
        ValidatorError::TooManyPendingRequests { .. } => "capacity",
        ValidatorError::TimestampInFuture { .. } => "future",
        _ => "other",
    }
}

#[async_trait]
impl<D: ChainDialer> ValidatorApi for ValidatorNode<D> {
    async fn register_validator(&self, stake: u128) -> Result<(), ValidatorError> {
        ValidatorNode::register_validator(self, stake).await
    }

    fn process_validation_request(
        &self,
        message: ValidationMessage,
    ) -> Result<(), ValidatorError> {
        ValidatorNode::process_validation_request(self, message)
    }

    fn process_signature_share(
        &self,
        share: SignatureShare,
    ) -> Result<SignatureOutcome, ValidatorError> {
        ValidatorNode::process_signature_share(self, share)
    }

    async fn submit_validation(
        &self,
        request_id: RequestId,
    ) -> Result<SubmissionReceipt, ValidatorError> {
        ValidatorNode::submit_validation(self, request_id).await
    }

    fn get_validation_status(&self, request_id: RequestId) -> Option<RequestStatus> {
        ValidatorNode::get_validation_status(self, request_id)
    }

    fn get_signatures(&self, request_id: RequestId) -> Option<Vec<SignatureShare>> {
        ValidatorNode::get_signatures(self, request_id)
    }

    fn get_pending_validation_count(&self) -> usize {
        ValidatorNode::get_pending_validation_count(self)
    }

    fn validator(&self) -> Validator {
        ValidatorNode::validator(self)
    }
}
