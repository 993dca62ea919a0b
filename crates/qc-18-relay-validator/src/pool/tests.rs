use super::*;
use crate::adapters::InMemoryChain;
use crate::error::ChainError;

fn pool_with(
    max_conns: usize,
    max_idle: usize,
    idle_secs: u64,
) -> (InMemoryChain, ConnectionPool<InMemoryChain>) {
    let chain = InMemoryChain::new(1337);
    let config = PoolConfig {
        max_conns,
        max_idle,
        idle_timeout: Duration::from_secs(idle_secs),
    };
    let pool = ConnectionPool::new(chain.clone(), "mem://chain", config);
    (chain, pool)
}

#[tokio::test(start_paused = true)]
async fn test_reuses_idle_connection() {
    let (chain, pool) = pool_with(2, 2, 60);

    let conn = pool.get().await.unwrap();
    let id = conn.id();
    pool.put(conn);

    let again = pool.get().await.unwrap();
    assert_eq!(again.id(), id);
    assert_eq!(chain.dial_count(), 1);
    assert_eq!(pool.stats().total_reused, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_at_max_conns() {
    let (_chain, pool) = pool_with(2, 2, 60);

    let _a = pool.get().await.unwrap();
    let _b = pool.get().await.unwrap();
    assert_eq!(pool.get().await.unwrap_err(), PoolError::Exhausted { max: 2 });
    assert_eq!(pool.stats().active, 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_connection_never_served() {
    // Scenario A: idle connection past its timeout is closed, a fresh one is dialed
    let (chain, pool) = pool_with(2, 2, 1);

    let c1 = pool.get().await.unwrap();
    let c1_id = c1.id();
    let c1_client = Arc::clone(c1.client());
    pool.put(c1);

    tokio::time::advance(Duration::from_millis(1_500)).await;

    let c2 = pool.get().await.unwrap();
    assert_ne!(c2.id(), c1_id);
    assert!(c1_client.is_closed());
    assert!(!c2.client().is_closed());
    assert_eq!(chain.dial_count(), 2);
    assert_eq!(pool.stats().active, 1);
    assert_eq!(pool.stats().idle, 0);
}

#[tokio::test(start_paused = true)]
async fn test_put_closes_when_idle_full() {
    let (chain, pool) = pool_with(3, 1, 60);

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    pool.put(a);
    pool.put(b);

    let stats = pool.stats();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(chain.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_put_after_close_closes_connection() {
    let (chain, pool) = pool_with(2, 2, 60);

    let conn = pool.get().await.unwrap();
    let client = Arc::clone(conn.client());
    pool.close();
    assert!(client.is_closed());

    pool.put(conn);
    assert_eq!(pool.stats().idle, 0);
    assert_eq!(chain.close_count(), 1);
    assert_eq!(pool.get().await.unwrap_err(), PoolError::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_return_after_close_counted_once() {
    let (_chain, pool) = pool_with(3, 3, 60);

    let kept = pool.get().await.unwrap();
    let dropped = pool.get().await.unwrap();
    let idle = pool.get().await.unwrap();
    pool.put(idle);
    pool.close();
    assert_eq!(pool.stats().total_closed, 3);

    pool.put(kept);
    pool.discard(dropped);
    assert_eq!(pool.stats().total_closed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_put_unknown_connection_closes_it() {
    let (_chain, pool) = pool_with(2, 2, 60);
    let (_other_chain, other) = pool_with(2, 2, 60);

    let foreign = other.get().await.unwrap();
    let mine = pool.get().await.unwrap();
    pool.put(mine);

    // Same id as ours, but not in our active set
    let foreign_client = Arc::clone(foreign.client());
    pool.put(foreign);
    assert!(foreign_client.is_closed());
    assert_eq!(pool.stats().idle, 1);
}

#[tokio::test(start_paused = true)]
async fn test_dial_failure_releases_slot() {
    let (chain, pool) = pool_with(1, 1, 60);

    chain.set_fail_dial(true);
    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, PoolError::DialFailed(ChainError::Unreachable(_))));
    assert_eq!(pool.stats().dialing, 0);

    chain.set_fail_dial(false);
    assert!(pool.get().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_discard_frees_slot() {
    let (chain, pool) = pool_with(1, 1, 60);

    let conn = pool.get().await.unwrap();
    pool.discard(conn);

    assert_eq!(pool.stats().active, 0);
    assert_eq!(chain.close_count(), 1);
    assert!(pool.get().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_closes_only_expired() {
    let (chain, pool) = pool_with(3, 3, 10);

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    pool.put(a);
    tokio::time::advance(Duration::from_secs(6)).await;
    pool.put(b);
    tokio::time::advance(Duration::from_secs(5)).await;

    assert_eq!(pool.cleanup(), 1);
    assert_eq!(pool.stats().idle, 1);
    assert_eq!(chain.close_count(), 1);

    // Idempotent once nothing else has expired
    assert_eq!(pool.cleanup(), 0);
    assert_eq!(pool.stats().idle, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_on_empty_pool_is_noop() {
    let (chain, pool) = pool_with(2, 2, 1);
    let before = pool.stats();

    assert_eq!(pool.cleanup(), 0);
    assert_eq!(pool.cleanup(), 0);
    assert_eq!(pool.stats(), before);
    assert_eq!(chain.close_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_loop_stops_on_shutdown() {
    let (chain, pool) = pool_with(2, 2, 2);
    let pool = Arc::new(pool);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let conn = pool.get().await.unwrap();
    pool.put(conn);
    let handle = pool.start_cleanup(shutdown_rx);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(pool.stats().idle, 0);
    assert_eq!(chain.close_count(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_active_never_exceeds_max_under_contention() {
    let (_chain, pool) = pool_with(3, 3, 60);
    let pool = Arc::new(pool);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                for _ in 0..20 {
                    if let Ok(conn) = pool.get().await {
                        let stats = pool.stats();
                        assert!(stats.active + stats.dialing <= 3);
                        tokio::task::yield_now().await;
                        pool.put(conn);
                    }
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }
    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert!(stats.idle <= 3);
}
