//! # Expiry & Health Monitor
//!
//! Periodic background loops owned by a [`ValidatorNode`]. Both tick on a
//! `tokio::time::interval` with skipped missed ticks and stop when the
//! shutdown watch channel flips to `true` (or its sender is dropped).

use crate::ports::ChainDialer;
use crate::service::ValidatorNode;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Prune expired requests every `period`.
pub async fn run_expiry_loop<D: ChainDialer>(
    node: ValidatorNode<D>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = node.cleanup_expired_requests();
                if removed > 0 {
                    debug!(removed = removed, "[qc-18] Expiry sweep");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("[qc-18] Expiry loop stopped");
}

/// Probe chain health every `period`.
pub async fn run_health_loop<D: ChainDialer>(
    node: ValidatorNode<D>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = node.perform_health_check().await;
                debug!("[qc-18] Health check: {}", status);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("[qc-18] Health loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ChannelTransport, InMemoryChain, ManualTimeSource};
    use crate::config::ValidatorConfig;
    use crate::domain::{ValidationMessage, ValidatorStatus};
    use crate::error::ChainError;
    use shared_crypto::ValidatorKeyPair;
    use std::sync::Arc;

    fn node(chain: &InMemoryChain, clock: &ManualTimeSource) -> ValidatorNode<InMemoryChain> {
        let mut config = ValidatorConfig::for_testing();
        config.sign_requests = false;
        config.cleanup_interval = Duration::from_secs(10);
        config.health_check_interval = Duration::from_secs(30);
        let (transport, _rx) = ChannelTransport::new();
        ValidatorNode::new(
            config,
            ValidatorKeyPair::generate(),
            chain.clone(),
            Arc::new(transport),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_loop_prunes_after_tick() {
        // Scenario C: a request past its deadline is gone after one sweep
        let chain = InMemoryChain::new(1337);
        let clock = ManualTimeSource::new(1_000);
        let node = node(&chain, &clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        node.process_validation_request(ValidationMessage {
            request_id: 1,
            payment_id: "pay-1".into(),
            message_hash: "11".repeat(32),
            timestamp: 1_000,
            high_value: false,
        })
        .unwrap();

        // Deadline is now - 1s
        clock.advance(61);
        let handle = tokio::spawn(run_expiry_loop(
            node.clone(),
            Duration::from_secs(10),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(node.get_validation_status(1).is_none());
        assert_eq!(node.get_pending_validation_count(), 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_loop_tracks_chain() {
        let chain = InMemoryChain::new(1337);
        chain.set_block_height(42);
        let clock = ManualTimeSource::new(1_000);
        let node = node(&chain, &clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_health_loop(
            node.clone(),
            Duration::from_secs(30),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(node.status(), ValidatorStatus::Healthy);
        assert_eq!(node.validator().last_block_height, Some(42));

        chain.set_failure(Some(ChainError::Unreachable("down".into())));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(node.status(), ValidatorStatus::Unhealthy);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_stop_when_sender_dropped() {
        let chain = InMemoryChain::new(1337);
        let clock = ManualTimeSource::new(1_000);
        let node = node(&chain, &clock);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let expiry = tokio::spawn(run_expiry_loop(
            node.clone(),
            Duration::from_secs(10),
            shutdown_rx.clone(),
        ));
        let health = tokio::spawn(run_health_loop(node, Duration::from_secs(30), shutdown_rx));

        drop(shutdown_tx);
        expiry.await.unwrap();
        health.await.unwrap();
    }
}
