//! # QC-18 Relay Validator
//!
//! Validator consensus core of the cross-chain payment relay network.
//!
//! **Subsystem ID:** 18
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//! **Status:** Production-Ready
//!
//! ## Purpose
//!
//! A relay validator registers stake, receives payment-validation requests
//! from the peer network, signs them, collects signature shares from the
//! other validators and reports when a request has reached quorum so it can
//! be finalized by the validator contract:
//! - BFT-style threshold (default 67% of known validators)
//! - One recoverable secp256k1 signature per validator per request
//! - Absolute deadlines, pruned by a periodic sweep
//! - Bounded, reusable chain RPC connections
//!
//! ## Request Lifecycle
//!
//! ```text
//!  ValidationMessage ──→ [PENDING] ──shares ≥ threshold──→ [THRESHOLD_REACHED] ──chain ok──→ [SUBMITTED]
//!                            │                                    │
//!                            └──────────── deadline ──────────────┴──────────────────────→ [EXPIRED]
//! ```
//!
//! `SUBMITTED` and `EXPIRED` are terminal: the entry is removed from the
//! registry and never recreated.
//!
//! ## Module Structure
//!
//! ```text
//! qc-18-relay-validator/
//! ├── domain/     # Validator, ValidationRequest, RequestRegistry
//! ├── ports/      # ValidatorApi, ChainClient, ChainDialer, SignatureTransport
//! ├── pool/       # Bounded chain connection pool
//! ├── service/    # ValidatorNode
//! ├── monitor     # Expiry sweep and health check loops
//! └── adapters/   # In-memory chain, channel transport, clocks
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_18_relay_validator::{ValidatorApi, ValidatorConfig, ValidatorNode};
//!
//! let node = ValidatorNode::new(config, keypair, dialer, transport, clock)?;
//! let handles = node.start(shutdown_rx.clone()).await?;
//!
//! node.process_validation_request(message)?;
//! let status = node.get_validation_status(message.request_id);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{
    ChannelTransport, InMemoryChain, InMemoryChainClient, ManualTimeSource, SubmittedValidation,
    SystemTimeSource,
};
pub use config::{ConfigError, PoolConfig, ValidatorConfig};
pub use domain::{
    required_signatures, RequestId, RequestRegistry, RequestState, RequestStatus,
    SignatureOutcome, SignatureShare, ValidationMessage, ValidationRequest, Validator,
    ValidatorSet, ValidatorStatus,
};
pub use error::{ChainError, PoolError, TransportError, ValidatorError, ValidatorResult};
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use ports::{
    ChainClient, ChainDialer, InboundMessage, SignatureTransport, TimeSource, TxHash,
    ValidatorApi,
};
pub use service::{SubmissionReceipt, ValidatorNode};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
