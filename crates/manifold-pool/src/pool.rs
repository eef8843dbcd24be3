// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded async connection pool.
//!
//! Connections are created lazily up to `max_connections`, recycled through
//! an idle list, revalidated on a timer, and reaped after sitting idle too
//! long. Waiting acquirers form a strict FIFO queue (a fair semaphore), and
//! every capacity change happens under one mutex so a connection can never be
//! handed to two acquirers or sit in the idle list while in use.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use manifold_core::ManifoldError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::factory::ConnectionFactory;

/// Pool sizing and lifecycle knobs.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Connections the reaper never prunes below.
    pub min_connections: usize,
    /// Hard cap on live connections.
    pub max_connections: usize,
    /// How long an acquire waits before failing with `PoolTimeout`.
    pub acquire_timeout: Duration,
    /// Idleness after which a connection becomes eligible for reaping.
    pub idle_timeout: Duration,
    /// Age after which a connection is retired on release instead of reused.
    pub max_connection_age: Duration,
    /// Cadence of the idle-connection validation sweep.
    pub validate_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_connection_age: Duration::from_secs(3600),
            validate_interval: Duration::from_secs(60),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub waiting: usize,
    pub created_total: u64,
    pub destroyed_total: u64,
    pub creation_failures: u64,
    pub acquire_timeouts: u64,
}

struct IdleConn<C> {
    conn: C,
    id: u64,
    created_at: Instant,
    idle_since: Instant,
    use_count: u64,
}

struct LiveConn<C> {
    conn: C,
    id: u64,
    created_at: Instant,
    use_count: u64,
}

struct PoolState<C> {
    /// Back = most recently released. The reaper scans from the front.
    idle: VecDeque<IdleConn<C>>,
    /// Live connections: idle + in use (+ briefly, out for validation).
    total: usize,
    closed: bool,
    created_total: u64,
    destroyed_total: u64,
    creation_failures: u64,
    acquire_timeouts: u64,
}

struct PoolShared<F: ConnectionFactory> {
    factory: F,
    options: PoolOptions,
    state: Mutex<PoolState<F::Connection>>,
    /// One permit per live-or-creatable connection. Fair, so waiters are
    /// served in arrival order.
    capacity: Arc<Semaphore>,
    waiting: AtomicUsize,
    next_conn_id: AtomicU64,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> PoolShared<F> {
    /// A panic while holding the lock leaves counters stale at worst;
    /// recover instead of cascading the poison.
    fn state(&self) -> MutexGuard<'_, PoolState<F::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a connection pool. Cheap to clone; all clones share state.
pub struct Pool<F: ConnectionFactory> {
    shared: Arc<PoolShared<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Creates a pool and spawns its validator and reaper tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(factory: F, options: PoolOptions) -> Self {
        let shared = Arc::new(PoolShared {
            capacity: Arc::new(Semaphore::new(options.max_connections)),
            factory,
            options,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                total: 0,
                closed: false,
                created_total: 0,
                destroyed_total: 0,
                creation_failures: 0,
                acquire_timeouts: 0,
            }),
            waiting: AtomicUsize::new(0),
            next_conn_id: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });

        let validator = tokio::spawn(validator_loop(shared.clone()));
        let reaper = tokio::spawn(reaper_loop(shared.clone()));
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([validator, reaper]);

        Self { shared }
    }

    /// Acquires a connection: idle-first, then lazy creation, then a FIFO
    /// wait bounded by `acquire_timeout`.
    ///
    /// Creation failures propagate to the acquirer whose request triggered
    /// the creation; the reserved capacity slot is released so later
    /// acquirers can retry.
    pub async fn acquire(&self) -> Result<PooledConnection<F>, ManifoldError> {
        let shared = &self.shared;

        let permit = match shared.capacity.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(ManifoldError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                shared.waiting.fetch_add(1, Ordering::Relaxed);
                let waited = tokio::time::timeout(
                    shared.options.acquire_timeout,
                    shared.capacity.clone().acquire_owned(),
                )
                .await;
                shared.waiting.fetch_sub(1, Ordering::Relaxed);
                match waited {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(ManifoldError::PoolClosed),
                    Err(_) => {
                        shared.state().acquire_timeouts += 1;
                        return Err(ManifoldError::PoolTimeout {
                            duration: shared.options.acquire_timeout,
                        });
                    }
                }
            }
        };

        // Re-check under the lock: the pool may have closed while we waited.
        let reusable = {
            let mut state = shared.state();
            if state.closed {
                return Err(ManifoldError::PoolClosed);
            }
            state.idle.pop_back()
        };

        let live = match reusable {
            Some(idle) => {
                debug!(conn_id = idle.id, use_count = idle.use_count + 1, "reusing idle connection");
                LiveConn {
                    conn: idle.conn,
                    id: idle.id,
                    created_at: idle.created_at,
                    use_count: idle.use_count + 1,
                }
            }
            None => match shared.factory.create().await {
                Ok(conn) => {
                    let id = shared.next_conn_id.fetch_add(1, Ordering::Relaxed);
                    let mut state = shared.state();
                    state.total += 1;
                    state.created_total += 1;
                    debug!(conn_id = id, total = state.total, "created connection");
                    LiveConn {
                        conn,
                        id,
                        created_at: Instant::now(),
                        use_count: 1,
                    }
                }
                Err(e) => {
                    shared.state().creation_failures += 1;
                    drop(permit);
                    return Err(e);
                }
            },
        };

        Ok(PooledConnection {
            live: Some(live),
            permit: Some(permit),
            shared: shared.clone(),
        })
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state();
        PoolStats {
            total: state.total,
            idle: state.idle.len(),
            in_use: state.total - state.idle.len(),
            waiting: self.shared.waiting.load(Ordering::Relaxed),
            created_total: state.created_total,
            destroyed_total: state.destroyed_total,
            creation_failures: state.creation_failures,
            acquire_timeouts: state.acquire_timeouts,
        }
    }

    /// Closes the pool: rejects queued and future acquirers with
    /// `PoolClosed`, destroys idle connections, and stops the maintenance
    /// tasks. Connections currently checked out are destroyed on release.
    /// Idempotent.
    pub async fn close(&self) {
        let drained = {
            let mut state = self.shared.state();
            if state.closed {
                return;
            }
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total -= drained.len();
            state.destroyed_total += drained.len() as u64;
            drained
        };

        self.shared.shutdown.cancel();
        self.shared.capacity.close();

        for idle in drained {
            if let Err(e) = self.shared.factory.destroy(idle.conn).await {
                warn!(conn_id = idle.id, error = %e, "connection destroy failed");
            }
        }

        let tasks = std::mem::take(
            &mut *self
                .shared
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            let _ = task.await;
        }

        debug!("pool closed");
    }
}

/// RAII guard for an in-use connection.
///
/// Dropping the guard returns the connection to the pool (waking the
/// longest-waiting acquirer, if any) or retires it when the pool is closed
/// or the connection has outlived `max_connection_age`.
pub struct PooledConnection<F: ConnectionFactory> {
    live: Option<LiveConn<F::Connection>>,
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<PoolShared<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Pool-assigned id of the underlying connection.
    pub fn id(&self) -> u64 {
        match &self.live {
            Some(live) => live.id,
            None => unreachable!("guard accessed after drop"),
        }
    }

    /// Times this connection has been acquired, including this checkout.
    pub fn use_count(&self) -> u64 {
        match &self.live {
            Some(live) => live.use_count,
            None => unreachable!("guard accessed after drop"),
        }
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.live {
            Some(live) => &live.conn,
            None => unreachable!("guard accessed after drop"),
        }
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.live {
            Some(live) => &mut live.conn,
            None => unreachable!("guard accessed after drop"),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PooledConnection");
        if let Some(live) = &self.live {
            s.field("id", &live.id).field("use_count", &live.use_count);
        }
        s.finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(live) = self.live.take() else {
            return;
        };
        let permit = self.permit.take();

        let retire = {
            let state = self.shared.state();
            state.closed || live.created_at.elapsed() >= self.shared.options.max_connection_age
        };

        if retire {
            {
                let mut state = self.shared.state();
                state.total -= 1;
                state.destroyed_total += 1;
            }
            spawn_destroy(self.shared.clone(), live.conn, live.id);
        } else {
            let mut state = self.shared.state();
            state.idle.push_back(IdleConn {
                conn: live.conn,
                id: live.id,
                created_at: live.created_at,
                idle_since: Instant::now(),
                use_count: live.use_count,
            });
        }

        // The permit is released only after the connection is back in the
        // idle list, so a woken waiter always finds it there.
        drop(permit);
    }
}

fn spawn_destroy<F: ConnectionFactory>(shared: Arc<PoolShared<F>>, conn: F::Connection, id: u64) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = shared.factory.destroy(conn).await {
                    warn!(conn_id = id, error = %e, "connection destroy failed");
                }
            });
        }
        Err(_) => {
            // Runtime already gone (process teardown); drop in place.
            debug!(conn_id = id, "no runtime for async destroy, dropping connection");
        }
    }
}

async fn validator_loop<F: ConnectionFactory>(shared: Arc<PoolShared<F>>) {
    // interval() panics on a zero period.
    let period = shared.options.validate_interval.max(Duration::from_millis(100));
    let mut interval = tokio::time::interval(period);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => validate_idle(&shared).await,
            _ = shared.shutdown.cancelled() => break,
        }
    }
}

/// Revalidates idle connections, oldest-idle first.
///
/// Each connection is taken out under a capacity permit so acquirers cannot
/// over-create while it is being probed; if no permit is free the pool is
/// busy and the sweep is skipped.
async fn validate_idle<F: ConnectionFactory>(shared: &Arc<PoolShared<F>>) {
    let batch = shared.state().idle.len();

    for _ in 0..batch {
        let Ok(permit) = shared.capacity.clone().try_acquire_owned() else {
            return;
        };

        let candidate = {
            let mut state = shared.state();
            if state.closed { None } else { state.idle.pop_front() }
        };
        let Some(mut idle) = candidate else {
            drop(permit);
            return;
        };

        if shared.factory.validate(&mut idle.conn).await {
            let mut state = shared.state();
            if state.closed {
                state.total -= 1;
                state.destroyed_total += 1;
                drop(state);
                spawn_destroy(shared.clone(), idle.conn, idle.id);
            } else {
                // Front, to keep the deque ordered oldest-idle-first.
                state.idle.push_front(idle);
            }
        } else {
            {
                let mut state = shared.state();
                state.total -= 1;
                state.destroyed_total += 1;
            }
            debug!(conn_id = idle.id, "idle connection failed validation");
            if let Err(e) = shared.factory.destroy(idle.conn).await {
                warn!(conn_id = idle.id, error = %e, "connection destroy failed");
            }
        }

        drop(permit);
    }
}

async fn reaper_loop<F: ConnectionFactory>(shared: Arc<PoolShared<F>>) {
    let period = (shared.options.idle_timeout / 4).max(Duration::from_millis(100));
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => reap_idle(&shared).await,
            _ = shared.shutdown.cancelled() => break,
        }
    }
}

/// Destroys connections idle past `idle_timeout`, never shrinking the pool
/// below `min_connections`.
async fn reap_idle<F: ConnectionFactory>(shared: &Arc<PoolShared<F>>) {
    let mut expired = Vec::new();
    {
        let mut state = shared.state();
        while state.total > shared.options.min_connections {
            let timed_out = state
                .idle
                .front()
                .is_some_and(|idle| idle.idle_since.elapsed() >= shared.options.idle_timeout);
            if !timed_out {
                break;
            }
            if let Some(idle) = state.idle.pop_front() {
                state.total -= 1;
                state.destroyed_total += 1;
                expired.push(idle);
            }
        }
    }

    for idle in expired {
        debug!(conn_id = idle.id, "reaping idle connection");
        if let Err(e) = shared.factory.destroy(idle.conn).await {
            warn!(conn_id = idle.id, error = %e, "connection destroy failed");
        }
    }
}
