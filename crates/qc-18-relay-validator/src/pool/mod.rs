//! # Connection Pool
//!
//! Bounded reuse of chain RPC client handles.
//!
//! ## Connection States
//!
//! ```text
//!            dial                 put (valid, room)
//!  [NEW] ──────────→ [ACTIVE] ─────────────────────→ [IDLE]
//!                      │  ↑           get (fresh)       │
//!                      │  └─────────────────────────────┘
//!                      │ put (expired / full / unknown)  │ idle ≥ idle_timeout
//!                      └──────────→ [CLOSED] ←───────────┘
//! ```
//!
//! A connection is in exactly one of idle queue, active set or closed.
//! Active plus in-flight dials never exceed `max_conns`.
//!
//! The mutex is never held across a dial; a slot is reserved first and
//! released by [`DialSlot`] if the dial fails or is cancelled.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::metrics;
use crate::ports::{ChainClient, ChainDialer};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// A checked-out or idle chain client handle.
pub struct PooledConnection<C> {
    id: u64,
    client: Arc<C>,
    created_at: Instant,
    last_used: Instant,
}

impl<C> PooledConnection<C> {
    /// Pool-assigned connection ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Shared client handle.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Time the connection was dialed.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time the connection was last handed out or returned.
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    fn is_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_used) >= idle_timeout
    }
}

impl<C> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("last_used", &self.last_used)
            .finish()
    }
}

/// Point-in-time pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Checked-out connections
    pub active: usize,
    /// Idle connections
    pub idle: usize,
    /// Dials in flight
    pub dialing: usize,
    /// Configured maximum
    pub max_conns: usize,
    /// Whether the pool is closed
    pub closed: bool,
    /// Connections dialed since creation
    pub total_dialed: u64,
    /// Idle connections handed out again
    pub total_reused: u64,
    /// Connections closed by the pool
    pub total_closed: u64,
}

struct PoolState<C> {
    idle: VecDeque<PooledConnection<C>>,
    active: HashMap<u64, Arc<C>>,
    dialing: usize,
    closed: bool,
}

impl<C> PoolState<C> {
    fn in_use(&self) -> usize {
        self.active.len() + self.dialing
    }
}

/// Reserved dial slot; releases itself unless the dial completes.
struct DialSlot<'a, C> {
    state: &'a Mutex<PoolState<C>>,
    armed: bool,
}

impl<C> Drop for DialSlot<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock();
            state.dialing = state.dialing.saturating_sub(1);
        }
    }
}

/// Bounded pool of chain clients for one endpoint.
pub struct ConnectionPool<D: ChainDialer> {
    dialer: D,
    endpoint: String,
    config: PoolConfig,
    state: Mutex<PoolState<D::Client>>,
    next_id: AtomicU64,
    total_dialed: AtomicU64,
    total_reused: AtomicU64,
    total_closed: AtomicU64,
}

impl<D: ChainDialer> ConnectionPool<D> {
    /// Create an empty pool. Nothing is dialed until the first `get`.
    pub fn new(dialer: D, endpoint: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            dialer,
            endpoint: endpoint.into(),
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: HashMap::new(),
                dialing: 0,
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            total_dialed: AtomicU64::new(0),
            total_reused: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
        }
    }

    /// Endpoint this pool dials.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection, reusing a fresh idle one or dialing a new one.
    pub async fn get(&self) -> Result<PooledConnection<D::Client>, PoolError> {
        let now = Instant::now();
        let mut stale = Vec::new();

        let slot = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }

            let mut reused = None;
            while let Some(mut conn) = state.idle.pop_front() {
                if conn.is_expired(now, self.config.idle_timeout) {
                    stale.push(conn);
                    continue;
                }
                conn.last_used = now;
                state.active.insert(conn.id, Arc::clone(&conn.client));
                reused = Some(conn);
                break;
            }

            if let Some(conn) = reused {
                self.publish(&state);
                drop(state);
                self.close_all(stale);
                self.total_reused.fetch_add(1, Ordering::Relaxed);
                debug!("[qc-18] Reusing pooled connection {}", conn.id);
                return Ok(conn);
            }

            if state.in_use() >= self.config.max_conns {
                drop(state);
                self.close_all(stale);
                return Err(PoolError::Exhausted {
                    max: self.config.max_conns,
                });
            }

            state.dialing += 1;
            DialSlot {
                state: &self.state,
                armed: true,
            }
        };
        self.close_all(stale);

        let client = self
            .dialer
            .dial(&self.endpoint)
            .await
            .map_err(PoolError::DialFailed)?;
        self.total_dialed.fetch_add(1, Ordering::Relaxed);

        let mut slot = slot;
        let mut state = self.state.lock();
        state.dialing = state.dialing.saturating_sub(1);
        slot.armed = false;

        if state.closed {
            drop(state);
            client.close();
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let client = Arc::new(client);
        state.active.insert(id, Arc::clone(&client));
        self.publish(&state);
        drop(state);

        debug!("[qc-18] Dialed new connection {} to {}", id, self.endpoint);
        let now = Instant::now();
        Ok(PooledConnection {
            id,
            client,
            created_at: now,
            last_used: now,
        })
    }

    /// Return a connection. Never blocks on the network.
    pub fn put(&self, mut conn: PooledConnection<D::Client>) {
        let now = Instant::now();
        let mut state = self.state.lock();

        if state.closed {
            // Already closed and counted by `close`
            drop(state);
            conn.client.close();
            return;
        }

        let keep = state.active.remove(&conn.id).is_some()
            && !conn.is_expired(now, self.config.idle_timeout)
            && state.idle.len() < self.config.max_idle;

        if keep {
            conn.last_used = now;
            state.idle.push_back(conn);
            self.publish(&state);
            return;
        }

        self.publish(&state);
        drop(state);
        debug!("[qc-18] Closing returned connection {}", conn.id);
        self.close_one(&conn.client);
    }

    /// Drop a connection that failed mid-use instead of returning it.
    pub fn discard(&self, conn: PooledConnection<D::Client>) {
        let closed = {
            let mut state = self.state.lock();
            state.active.remove(&conn.id);
            self.publish(&state);
            state.closed
        };
        debug!("[qc-18] Discarding connection {}", conn.id);
        if closed {
            conn.client.close();
        } else {
            self.close_one(&conn.client);
        }
    }

    /// Close idle connections past their idle timeout. Returns the number closed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<PooledConnection<D::Client>> = {
            let mut state = self.state.lock();
            let mut expired = Vec::new();
            let mut fresh = VecDeque::with_capacity(state.idle.len());
            for conn in state.idle.drain(..) {
                if conn.is_expired(now, self.config.idle_timeout) {
                    expired.push(conn);
                } else {
                    fresh.push_back(conn);
                }
            }
            state.idle = fresh;
            self.publish(&state);
            expired
        };

        let closed = expired.len();
        self.close_all(expired);
        if closed > 0 {
            debug!("[qc-18] Pool cleanup closed {} idle connections", closed);
        }
        closed
    }

    /// Spawn the periodic cleanup loop (every `idle_timeout / 2`).
    pub fn start_cleanup(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let period = (self.config.idle_timeout / 2).max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if pool.is_closed() {
                            break;
                        }
                        pool.cleanup();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("[qc-18] Pool cleanup loop stopped");
        })
    }

    /// Close the pool and every connection it knows about.
    pub fn close(&self) {
        let (idle, active) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            let active: Vec<_> = state.active.drain().map(|(_, client)| client).collect();
            self.publish(&state);
            (idle, active)
        };

        let count = idle.len() + active.len();
        self.close_all(idle);
        for client in &active {
            self.close_one(client);
        }
        info!("[qc-18] Connection pool closed ({} connections)", count);
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            active: state.active.len(),
            idle: state.idle.len(),
            dialing: state.dialing,
            max_conns: self.config.max_conns,
            closed: state.closed,
            total_dialed: self.total_dialed.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }

    fn close_one(&self, client: &Arc<D::Client>) {
        client.close();
        self.total_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn close_all(&self, conns: Vec<PooledConnection<D::Client>>) {
        for conn in conns {
            self.close_one(&conn.client);
        }
    }

    fn publish(&self, state: &PoolState<D::Client>) {
        metrics::set_pool_connections(state.active.len(), state.idle.len());
    }
}
