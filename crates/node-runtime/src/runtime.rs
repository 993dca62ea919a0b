//! # Relay Runtime
//!
//! Wires a [`ValidatorNode`] to its collaborators and owns the background
//! tasks around it.
//!
//! ## Startup Sequence
//!
//! 1. Start the node (chain check, registration read, monitor loops)
//! 2. Optionally register stake
//! 3. Spawn the inbound transport consumer
//! 4. Spawn the outbound share log sink, unless a peer network took the
//!    receiver with [`RelayRuntime::take_outbound`]
//! 5. Spawn the submission loop for threshold-reached requests
//!
//! The chain collaborator is the in-memory validator contract; a real RPC
//! client plugs in through the same `ChainDialer` port.

use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use qc_18_relay_validator::{
    ChannelTransport, InMemoryChain, InboundMessage, SignatureShare, SystemTimeSource,
    ValidatorConfig, ValidatorNode,
};
use shared_crypto::ValidatorKeyPair;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Inbound transport queue depth.
const INBOUND_QUEUE: usize = 1024;

/// Grace period for background tasks on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The relay validator runtime.
pub struct RelayRuntime {
    node: ValidatorNode<InMemoryChain>,
    chain: InMemoryChain,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<SignatureShare>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayRuntime {
    /// Create a runtime for `config` signing with `keypair`.
    pub fn new(config: ValidatorConfig, keypair: ValidatorKeyPair) -> Result<Self> {
        let chain = InMemoryChain::new(config.chain_id);
        let (transport, outbound_rx) = ChannelTransport::new();
        let node = ValidatorNode::new(
            config,
            keypair,
            chain.clone(),
            Arc::new(transport),
            Arc::new(SystemTimeSource),
        )
        .context("Invalid relay validator configuration")?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            node,
            chain,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_rx: Mutex::new(Some(outbound_rx)),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the node and every background task.
    pub async fn start(&self, stake: Option<u128>) -> Result<()> {
        info!("===========================================");
        info!("  Relay Validator Runtime v{}", qc_18_relay_validator::VERSION);
        info!("===========================================");

        let mut handles = self
            .node
            .start(self.shutdown_rx.clone())
            .await
            .context("Failed to start validator node")?;

        if let Some(stake) = stake {
            if self.node.validator().is_registered {
                info!("Validator already registered on-chain, skipping stake");
            } else {
                self.node
                    .register_validator(stake)
                    .await
                    .context("Failed to register validator")?;
            }
        }

        if let Some(inbound_rx) = self.inbound_rx.lock().take() {
            let node = self.node.clone();
            let shutdown = self.shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                node.run_transport(inbound_rx, shutdown).await;
            }));
        }

        if let Some(outbound_rx) = self.outbound_rx.lock().take() {
            handles.push(tokio::spawn(log_outbound(
                outbound_rx,
                self.shutdown_rx.clone(),
            )));
        }

        handles.push(tokio::spawn(run_submission_loop(
            self.node.clone(),
            self.node.config().cleanup_interval,
            self.shutdown_rx.clone(),
        )));

        self.tasks.lock().extend(handles);
        info!("Relay validator running against {}", self.node.pool().endpoint());
        Ok(())
    }

    /// Stop every background task and close the connection pool.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Background task failed: {}", e),
                Err(_) => warn!("Background task did not stop within {:?}", SHUTDOWN_GRACE),
            }
        }

        self.node.pool().close();
        info!("Shutdown complete");
    }

    /// Sender feeding the node's inbound transport.
    pub fn inbound(&self) -> mpsc::Sender<InboundMessage> {
        self.inbound_tx.clone()
    }

    /// Take the receiver of this node's own signature shares.
    ///
    /// A peer network calls this before [`start`](Self::start) to forward the
    /// shares itself; otherwise they only reach the debug log.
    pub fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<SignatureShare>> {
        self.outbound_rx.lock().take()
    }

    /// The validator node.
    pub fn node(&self) -> &ValidatorNode<InMemoryChain> {
        &self.node
    }

    /// The chain collaborator.
    pub fn chain(&self) -> &InMemoryChain {
        &self.chain
    }
}

/// Log sink for own signature shares when no peer network is attached.
async fn log_outbound(
    mut outbound: mpsc::UnboundedReceiver<SignatureShare>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            share = outbound.recv() => match share {
                Some(share) => debug!(
                    request_id = share.request_id,
                    "Own signature share (no peer network attached) {:?}",
                    share.signature
                ),
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Submit every threshold-reached request each `period`.
async fn run_submission_loop(
    node: ValidatorNode<InMemoryChain>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for request_id in node.ready_for_submission() {
                    if let Err(e) = node.submit_validation(request_id).await {
                        warn!(request_id, "Submission attempt failed: {}", e);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
