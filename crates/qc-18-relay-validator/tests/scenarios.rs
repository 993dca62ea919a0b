//! # Relay Validator Scenarios
//!
//! End-to-end flows through the public API.
//!
//! ## Test Categories
//!
//! 1. **Connection Pool** - exhaustion, reuse, idle expiry
//! 2. **Request Intake** - duplicates, expiry sweep
//! 3. **Quorum** - peer shares, multi-node signing, submission

use qc_18_relay_validator::{
    ChainDialer, ChannelTransport, ConnectionPool, InMemoryChain, InboundMessage,
    ManualTimeSource, PoolConfig, PoolError, RequestState, SignatureShare, ValidationMessage,
    ValidatorConfig, ValidatorError, ValidatorNode,
};
use shared_crypto::{keccak256, ValidatorKeyPair};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

// =============================================================================
// TEST HELPERS
// =============================================================================

const NOW: u64 = 1_700_000_000;

fn message(id: u64) -> ValidationMessage {
    ValidationMessage {
        request_id: id,
        payment_id: format!("payment-{id}"),
        message_hash: hex::encode(keccak256(format!("payment-{id}").as_bytes())),
        timestamp: NOW,
        high_value: false,
    }
}

fn node_with(
    key: ValidatorKeyPair,
    known: Vec<[u8; 20]>,
    chain: &InMemoryChain,
    clock: &ManualTimeSource,
    configure: impl FnOnce(&mut ValidatorConfig),
) -> (
    ValidatorNode<InMemoryChain>,
    mpsc::UnboundedReceiver<SignatureShare>,
) {
    let mut config = ValidatorConfig::for_testing();
    config.known_validators = known;
    configure(&mut config);

    let (transport, outbound) = ChannelTransport::new();
    let node = ValidatorNode::new(
        config,
        key,
        chain.clone(),
        Arc::new(transport),
        Arc::new(clock.clone()),
    )
    .unwrap();
    (node, outbound)
}

// =============================================================================
// CONNECTION POOL
// =============================================================================

#[tokio::test(start_paused = true)]
async fn scenario_a_pool_exhaustion_reuse_and_expiry() {
    let chain = InMemoryChain::new(1337);
    let pool = ConnectionPool::new(
        chain.clone(),
        "mem://chain",
        PoolConfig {
            max_conns: 2,
            max_idle: 2,
            idle_timeout: Duration::from_secs(1),
        },
    );

    let first = pool.get().await.unwrap();
    let _second = pool.get().await.unwrap();
    assert_eq!(pool.get().await.unwrap_err(), PoolError::Exhausted { max: 2 });

    let first_id = first.id();
    pool.put(first);

    // Within the idle timeout the returned connection is reused
    tokio::time::advance(Duration::from_millis(500)).await;
    let reused = pool.get().await.unwrap();
    assert_eq!(reused.id(), first_id);
    assert_eq!(chain.dial_count(), 2);

    // After the idle timeout it is discarded and a fresh dial occurs
    pool.put(reused);
    tokio::time::advance(Duration::from_secs(1)).await;
    let fresh = pool.get().await.unwrap();
    assert_ne!(fresh.id(), first_id);
    assert_eq!(chain.dial_count(), 3);
    assert_eq!(chain.close_count(), 1);
}

#[tokio::test]
async fn pool_close_rejects_new_checkouts() {
    let chain = InMemoryChain::new(1337);
    let pool = ConnectionPool::new(chain.clone(), "mem://chain", PoolConfig::for_testing());

    let conn = pool.get().await.unwrap();
    pool.put(conn);
    pool.close();

    assert!(pool.stats().closed);
    assert_eq!(pool.get().await.unwrap_err(), PoolError::Closed);
    assert_eq!(chain.close_count(), 1);
    // Dialer still usable on its own
    assert!(chain.dial("mem://chain").await.is_ok());
}

// =============================================================================
// REQUEST INTAKE
// =============================================================================

#[tokio::test]
async fn scenario_b_duplicate_request() {
    let chain = InMemoryChain::new(1337);
    let clock = ManualTimeSource::new(NOW);
    let (node, _outbound) = node_with(ValidatorKeyPair::generate(), vec![], &chain, &clock, |c| {
        c.sign_requests = false
    });

    node.process_validation_request(message(1)).unwrap();
    assert!(matches!(
        node.process_validation_request(message(1)),
        Err(ValidatorError::DuplicateRequest { request_id: 1 })
    ));
    assert_eq!(node.get_pending_validation_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_expired_request_swept() {
    let chain = InMemoryChain::new(1337);
    let clock = ManualTimeSource::new(NOW);
    let (node, _outbound) = node_with(ValidatorKeyPair::generate(), vec![], &chain, &clock, |c| {
        c.sign_requests = false;
        c.cleanup_interval = Duration::from_secs(10);
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = node.start(shutdown_rx).await.unwrap();

    node.process_validation_request(message(1)).unwrap();
    // Deadline becomes now - 1s
    clock.advance(61);
    tokio::time::sleep(Duration::from_secs(11)).await;

    assert!(node.get_validation_status(1).is_none());

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }
}

// =============================================================================
// QUORUM
// =============================================================================

#[tokio::test]
async fn scenario_d_two_signers_reach_threshold() {
    let chain = InMemoryChain::new(1337);
    let clock = ManualTimeSource::new(NOW);
    let peers = [ValidatorKeyPair::generate(), ValidatorKeyPair::generate()];
    let (node, _outbound) = node_with(
        ValidatorKeyPair::generate(),
        peers.iter().map(|k| k.address()).collect(),
        &chain,
        &clock,
        |c| {
            c.sign_requests = false;
            c.threshold_percent = 60;
            c.high_value_threshold_percent = 60;
        },
    );

    let msg = message(5);
    let hash = keccak256(b"payment-5");
    node.process_validation_request(msg).unwrap();

    for key in &peers {
        node.process_signature_share(SignatureShare {
            request_id: 5,
            signer: key.address(),
            signature: key.sign_hash(&hash).unwrap(),
        })
        .unwrap();
    }

    let status = node.get_validation_status(5).unwrap();
    assert_eq!(status.required_signatures, 2);
    assert_eq!(status.signature_count, 2);
    assert_eq!(status.state, RequestState::ThresholdReached);
    assert_eq!(node.ready_for_submission(), vec![5]);
}

#[tokio::test]
async fn three_nodes_reach_quorum_and_submit() {
    let chain = InMemoryChain::new(1337);
    let clock = ManualTimeSource::new(NOW);
    let keys: Vec<ValidatorKeyPair> = (0..3).map(|_| ValidatorKeyPair::generate()).collect();
    let addresses: Vec<[u8; 20]> = keys.iter().map(|k| k.address()).collect();

    let mut nodes = Vec::new();
    let mut outbounds = Vec::new();
    for key in keys {
        let (node, outbound) = node_with(key, addresses.clone(), &chain, &clock, |_| {});
        nodes.push(node);
        outbounds.push(outbound);
    }

    // Every node sees the request before any signing task runs
    for node in &nodes {
        node.process_validation_request(message(42)).unwrap();
    }

    // Gossip each node's own share to the other two
    for (i, mut outbound) in outbounds.into_iter().enumerate() {
        let peers: Vec<_> = nodes
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, n)| n.clone())
            .collect();
        tokio::spawn(async move {
            while let Some(share) = outbound.recv().await {
                for peer in &peers {
                    let _ = peer.process_signature_share(share.clone());
                }
            }
        });
    }

    for _ in 0..200 {
        if nodes.iter().all(|n| n.ready_for_submission() == vec![42]) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for node in &nodes {
        let status = node.get_validation_status(42).unwrap();
        assert_eq!(status.required_signatures, 3);
        assert_eq!(status.signature_count, 3);
    }

    let receipt = nodes[0].submit_validation(42).await.unwrap();
    assert_eq!(receipt.signature_count, 3);
    assert_eq!(receipt.state, RequestState::Submitted);

    let submitted = chain.submitted_validations();
    assert_eq!(submitted.len(), 1);
    let mut signers: Vec<_> = submitted[0].shares.iter().map(|s| s.signer).collect();
    signers.sort();
    let mut expected = addresses.clone();
    expected.sort();
    assert_eq!(signers, expected);
}

#[tokio::test]
async fn transport_loop_feeds_node() {
    let chain = InMemoryChain::new(1337);
    let clock = ManualTimeSource::new(NOW);
    let (node, mut outbound) =
        node_with(ValidatorKeyPair::generate(), vec![], &chain, &clock, |_| {});
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = node.clone();
    let task = tokio::spawn(async move { runner.run_transport(inbound_rx, shutdown_rx).await });

    inbound_tx
        .send(InboundMessage::ValidationRequest(message(3)))
        .await
        .unwrap();
    let own = outbound.recv().await.unwrap();
    assert_eq!(own.request_id, 3);
    assert_eq!(node.ready_for_submission(), vec![3]);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

#[test]
fn inbound_message_json_shape() {
    let json = serde_json::to_value(InboundMessage::ValidationRequest(message(1))).unwrap();
    assert_eq!(json["type"], "validation_request");
    assert_eq!(json["payload"]["request_id"], 1);

    let back: InboundMessage = serde_json::from_value(json).unwrap();
    assert_eq!(back, InboundMessage::ValidationRequest(message(1)));
}
