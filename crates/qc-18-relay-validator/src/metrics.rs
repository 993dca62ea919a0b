//! # Relay Validator Metrics
//!
//! Prometheus metrics for request throughput, signing and pool usage.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-18-relay-validator = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `relay_validator_requests_accepted_total` - Counter of requests tracked
//! - `relay_validator_requests_rejected_total` - Counter of rejected requests (by reason)
//! - `relay_validator_requests_expired_total` - Counter of requests pruned by the sweep
//! - `relay_validator_requests_submitted_total` - Counter of requests accepted by the contract
//! - `relay_validator_signatures_recorded_total` - Counter of signature shares recorded (by origin)
//! - `relay_validator_chain_failures_total` - Counter of failed chain calls (by operation)
//! - `relay_validator_pending_requests` - Gauge of tracked requests
//! - `relay_validator_healthy` - Gauge of advisory health (0=no, 1=yes)
//! - `relay_validator_pool_connections` - Gauge of pool connections (by state)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec, Gauge,
    GaugeVec, IntCounter, IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total requests tracked
    pub static ref REQUESTS_ACCEPTED: IntCounter = register_int_counter!(
        "relay_validator_requests_accepted_total",
        "Total number of validation requests tracked"
    )
    .expect("Failed to create REQUESTS_ACCEPTED metric");

    /// Total requests rejected, labeled by reason
    pub static ref REQUESTS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "relay_validator_requests_rejected_total",
        "Total number of validation requests rejected",
        &["reason"]
    )
    .expect("Failed to create REQUESTS_REJECTED metric");

    /// Total requests pruned after their deadline
    pub static ref REQUESTS_EXPIRED: IntCounter = register_int_counter!(
        "relay_validator_requests_expired_total",
        "Total number of validation requests pruned after their deadline"
    )
    .expect("Failed to create REQUESTS_EXPIRED metric");

    /// Total requests accepted by the validator contract
    pub static ref REQUESTS_SUBMITTED: IntCounter = register_int_counter!(
        "relay_validator_requests_submitted_total",
        "Total number of validation requests submitted"
    )
    .expect("Failed to create REQUESTS_SUBMITTED metric");

    /// Total signature shares recorded, labeled by origin
    pub static ref SIGNATURES_RECORDED: IntCounterVec = register_int_counter_vec!(
        "relay_validator_signatures_recorded_total",
        "Total number of signature shares recorded",
        &["origin"]
    )
    .expect("Failed to create SIGNATURES_RECORDED metric");

    /// Total failed chain calls, labeled by operation
    pub static ref CHAIN_FAILURES: IntCounterVec = register_int_counter_vec!(
        "relay_validator_chain_failures_total",
        "Total number of failed chain calls",
        &["operation"]
    )
    .expect("Failed to create CHAIN_FAILURES metric");

    /// Tracked requests
    pub static ref PENDING_REQUESTS: Gauge = register_gauge!(
        "relay_validator_pending_requests",
        "Number of tracked validation requests"
    )
    .expect("Failed to create PENDING_REQUESTS metric");

    /// Advisory health flag
    pub static ref HEALTHY: Gauge = register_gauge!(
        "relay_validator_healthy",
        "Whether the last health check reached the chain (0=no, 1=yes)"
    )
    .expect("Failed to create HEALTHY metric");

    /// Pool connections, labeled by state (active/idle)
    pub static ref POOL_CONNECTIONS: GaugeVec = register_gauge_vec!(
        "relay_validator_pool_connections",
        "Number of pooled chain connections",
        &["state"]
    )
    .expect("Failed to create POOL_CONNECTIONS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a request tracked
#[cfg(feature = "metrics")]
pub fn record_request_accepted() {
    REQUESTS_ACCEPTED.inc();
}

/// Record a request rejected with reason
#[cfg(feature = "metrics")]
pub fn record_request_rejected(reason: &str) {
    REQUESTS_REJECTED.with_label_values(&[reason]).inc();
}

/// Record requests pruned by the expiry sweep
#[cfg(feature = "metrics")]
pub fn record_requests_expired(count: u64) {
    REQUESTS_EXPIRED.inc_by(count);
}

/// Record a request accepted by the contract
#[cfg(feature = "metrics")]
pub fn record_request_submitted() {
    REQUESTS_SUBMITTED.inc();
}

/// Record a signature share recorded (`own` or `peer`)
#[cfg(feature = "metrics")]
pub fn record_signature(origin: &str) {
    SIGNATURES_RECORDED.with_label_values(&[origin]).inc();
}

/// Record a failed chain call
#[cfg(feature = "metrics")]
pub fn record_chain_failure(operation: &str) {
    CHAIN_FAILURES.with_label_values(&[operation]).inc();
}

/// Update tracked request gauge
#[cfg(feature = "metrics")]
pub fn set_pending_requests(count: usize) {
    PENDING_REQUESTS.set(count as f64);
}

/// Update health flag
#[cfg(feature = "metrics")]
pub fn set_healthy(healthy: bool) {
    HEALTHY.set(if healthy { 1.0 } else { 0.0 });
}

/// Update pool connection gauges
#[cfg(feature = "metrics")]
pub fn set_pool_connections(active: usize, idle: usize) {
    POOL_CONNECTIONS.with_label_values(&["active"]).set(active as f64);
    POOL_CONNECTIONS.with_label_values(&["idle"]).set(idle as f64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

/// Record a request tracked
#[cfg(not(feature = "metrics"))]
pub fn record_request_accepted() {}

/// Record a request rejected with reason
#[cfg(not(feature = "metrics"))]
pub fn record_request_rejected(_reason: &str) {}

/// Record requests pruned by the expiry sweep
#[cfg(not(feature = "metrics"))]
pub fn record_requests_expired(_count: u64) {}

/// Record a request accepted by the contract
#[cfg(not(feature = "metrics"))]
pub fn record_request_submitted() {}

/// Record a signature share recorded (`own` or `peer`)
#[cfg(not(feature = "metrics"))]
pub fn record_signature(_origin: &str) {}

/// Record a failed chain call
#[cfg(not(feature = "metrics"))]
pub fn record_chain_failure(_operation: &str) {}

/// Update tracked request gauge
#[cfg(not(feature = "metrics"))]
pub fn set_pending_requests(_count: usize) {}

/// Update health flag
#[cfg(not(feature = "metrics"))]
pub fn set_healthy(_healthy: bool) {}

/// Update pool connection gauges
#[cfg(not(feature = "metrics"))]
pub fn set_pool_connections(_active: usize, _idle: usize) {}
