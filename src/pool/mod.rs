//! Connection pooling subsystem.
//!
//! # Data Flow
//! ```text
//! Pool::get
//!     → wait for an active slot (max_active semaphore, bounded by timeout)
//!     → pop a healthy idle connection (LIFO, stale ones closed)
//!     → or reserve an open slot (max_open) and dial a new connection
//!     → run connection-used hooks
//!     → caller performs its RPC
//! Pool::release
//!     → back to the idle set, or closed if unhealthy / idle set full / pool closed
//! ```
//!
//! # Design Decisions
//! - Capacity is held by RAII guards inside `Connection`, so timeouts,
//!   cancelled futures and forgotten releases never leak slots
//! - No lock is held across an await point
//! - A get that holds an active permit but finds no idle connection and no
//!   free open slot parks on a `Notify` until one is released
//! - Dial errors are returned as-is; retry policy belongs to the caller

pub mod connection;
pub mod options;

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time;

use crate::error::{BoxError, PoolError};
use crate::observability::metrics;
use connection::{Lease, OpenSlot, PoolCounters};

pub use connection::{conn_use_at, Channel, Connection, ConnectionId};
pub use options::PoolOptions;

/// Transport collaborator: establishes a new channel to an address.
///
/// Any `Fn(String) -> impl Future<Output = Result<T, BoxError>>` is a dialer.
#[async_trait]
pub trait Dial<T: Channel>: Send + Sync {
    async fn dial(&self, addr: &str) -> Result<T, BoxError>;
}

#[async_trait]
impl<T, F, Fut> Dial<T> for F
where
    T: Channel,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    async fn dial(&self, addr: &str) -> Result<T, BoxError> {
        (self)(addr.to_string()).await
    }
}

/// Callback run on every connection handed out by [`Pool::get`].
pub type ConnectionHook<T> = Arc<dyn Fn(&mut Connection<T>) + Send + Sync>;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Gets served from the idle set.
    pub hits: u64,
    /// Gets that had to dial.
    pub misses: u64,
    /// Gets that gave up after the pool timeout.
    pub timeouts: u64,
    /// Gets that had to wait for an active slot.
    pub wait_count: u64,
    /// Total time spent waiting for active slots.
    pub wait_duration: Duration,
    /// Connections evicted as unhealthy or expired.
    pub stale_conns: u64,
    /// Open connections (idle + checked out + dialing).
    pub total_conns: usize,
    pub idle_conns: usize,
    /// Connections currently checked out.
    pub active_conns: usize,
}

/// A bounded pool of connections to a single address.
pub struct Pool<T: Channel> {
    addr: String,
    dial: Arc<dyn Dial<T>>,
    options: PoolOptions,
    hooks: Vec<ConnectionHook<T>>,
    /// Idle connections, most recently released last.
    idle: Mutex<Vec<Connection<T>>>,
    /// One permit per connection that may be checked out.
    slots: Arc<Semaphore>,
    counters: Arc<PoolCounters>,
    closed: AtomicBool,
}

impl<T: Channel> Pool<T> {
    /// Create an empty pool. No connection is dialed until first use
    /// (or until [`Pool::start`] fills `min_idle`).
    pub fn new(addr: impl Into<String>, dial: Arc<dyn Dial<T>>, options: PoolOptions) -> Self {
        let options = options.normalized();
        Self {
            addr: addr.into(),
            dial,
            slots: Arc::new(Semaphore::new(options.max_active)),
            idle: Mutex::new(Vec::with_capacity(options.max_idle)),
            options,
            hooks: Vec::new(),
            counters: Arc::new(PoolCounters::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a hook run, in insertion order, on every successful `get`.
    #[must_use]
    pub fn with_used_hook(mut self, hook: ConnectionHook<T>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Acquire a connection, waiting at most `options.timeout`.
    ///
    /// Dropping the returned future cancels the acquisition; any capacity
    /// reserved so far is released.
    pub async fn get(&self) -> Result<Connection<T>, PoolError> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        match time::timeout(self.options.timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                metrics::record_pool_timeout(&self.addr);
                tracing::debug!(
                    addr = %self.addr,
                    timeout = ?self.options.timeout,
                    "Timed out waiting for a pooled connection"
                );
                Err(PoolError::Timeout {
                    addr: self.addr.clone(),
                    timeout: self.options.timeout,
                })
            }
        }
    }

    async fn acquire(&self) -> Result<Connection<T>, PoolError> {
        let permit = self.acquire_permit().await?;

        loop {
            // Registered before looking, so a release in between is not missed.
            let released = self.counters.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.is_closed() {
                return Err(self.closed_error());
            }

            if let Some(conn) = self.pop_idle() {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(self.hand_out(conn, permit));
            }

            if let Some(slot) = OpenSlot::try_reserve(&self.counters, self.options.max_open) {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                let conn = self.dial_conn(slot).await?;
                if self.is_closed() {
                    self.close_conn(conn);
                    return Err(self.closed_error());
                }
                return Ok(self.hand_out(conn, permit));
            }

            // Every open slot is taken (for example by a min-idle dial) but we
            // hold an active permit, so a connection will come back or close.
            released.await;
        }
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(permit),
            Err(TryAcquireError::Closed) => Err(self.closed_error()),
            Err(TryAcquireError::NoPermits) => {
                self.counters.wait_count.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                let permit = self
                    .slots
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| self.closed_error());
                let waited = started.elapsed();
                self.counters
                    .wait_nanos
                    .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
                metrics::record_pool_wait(&self.addr, waited);
                permit
            }
        }
    }

    fn pop_idle(&self) -> Option<Connection<T>> {
        let mut stale = Vec::new();
        let found = {
            let mut idle = lock(&self.idle);
            loop {
                match idle.pop() {
                    Some(conn) if conn.is_healthy() => break Some(conn),
                    Some(conn) => stale.push(conn),
                    None => break None,
                }
            }
        };
        self.discard_stale(stale);
        found
    }

    fn hand_out(&self, mut conn: Connection<T>, permit: OwnedSemaphorePermit) -> Connection<T> {
        conn.set_lease(Lease::new(permit, &self.counters));
        for hook in &self.hooks {
            hook(&mut conn);
        }
        conn
    }

    async fn dial_conn(&self, slot: OpenSlot) -> Result<Connection<T>, PoolError> {
        let started = Instant::now();
        match self.dial.dial(&self.addr).await {
            Ok(channel) => {
                metrics::record_dial(&self.addr);
                let conn = Connection::new(
                    channel,
                    slot,
                    self.options.max_lifetime,
                    self.options.idle_timeout,
                );
                tracing::debug!(
                    addr = %self.addr,
                    connection_id = %conn.id(),
                    elapsed = ?started.elapsed(),
                    "Dialed new connection"
                );
                Ok(conn)
            }
            Err(source) => {
                metrics::record_dial_failure(&self.addr);
                tracing::warn!(addr = %self.addr, error = %source, "Dial failed");
                Err(PoolError::Dial {
                    addr: self.addr.clone(),
                    source,
                })
            }
        }
    }

    /// Return a connection obtained from [`Pool::get`].
    ///
    /// The connection is kept for reuse only if it is healthy, the idle set
    /// has room and the pool is still open; otherwise it is closed.
    pub fn release(&self, mut conn: Connection<T>) {
        // Dropped last, after the connection is back in the idle set.
        let _lease = conn.take_lease();

        if !conn.belongs_to(&self.counters) {
            tracing::warn!(addr = %self.addr, connection_id = %conn.id(), "Released a connection from another pool");
            self.close_conn(conn);
            return;
        }
        if !conn.is_healthy() {
            self.discard_stale(vec![conn]);
            return;
        }

        let mut idle = lock(&self.idle);
        if self.is_closed() || idle.len() >= self.options.max_idle {
            drop(idle);
            self.close_conn(conn);
            return;
        }
        idle.push(conn);
        drop(idle);
        self.counters.released.notify_one();
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let idle_conns = self.idle_len();
        let c = &self.counters;
        PoolStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            wait_count: c.wait_count.load(Ordering::Relaxed),
            wait_duration: Duration::from_nanos(c.wait_nanos.load(Ordering::Relaxed)),
            stale_conns: c.stale.load(Ordering::Relaxed),
            total_conns: c.open.load(Ordering::Acquire),
            idle_conns,
            active_conns: c.active.load(Ordering::Acquire),
        }
    }

    /// Close every idle connection and refuse further gets.
    ///
    /// Connections still checked out are closed when released. Calling this
    /// twice returns [`PoolError::Closed`].
    pub fn close(&self) -> Result<(), PoolError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(self.closed_error());
        }
        self.slots.close();
        self.counters.released.notify_waiters();

        let drained = std::mem::take(&mut *lock(&self.idle));
        let mut first_err = None;
        for conn in drained {
            if let Err(source) = conn.close() {
                first_err.get_or_insert(source);
            }
        }

        tracing::info!(addr = %self.addr, "Connection pool closed");
        match first_err {
            Some(source) => Err(PoolError::Close {
                addr: self.addr.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Dial until `min_idle` idle connections exist. Returns how many were dialed.
    pub async fn fill_min_idle(&self) -> Result<usize, PoolError> {
        let mut dialed = 0;
        while !self.is_closed() && self.idle_len() < self.options.min_idle {
            let Some(slot) = OpenSlot::try_reserve(&self.counters, self.options.max_open) else {
                break;
            };
            let conn = self.dial_conn(slot).await?;

            let mut idle = lock(&self.idle);
            if self.is_closed() || idle.len() >= self.options.max_idle {
                drop(idle);
                self.close_conn(conn);
                break;
            }
            // Fresh connections go to the bottom so recently used ones are reused first.
            idle.insert(0, conn);
            drop(idle);
            self.counters.released.notify_one();
            dialed += 1;
        }
        Ok(dialed)
    }

    /// Evict unhealthy idle connections. Returns how many were closed.
    pub fn reap(&self) -> usize {
        let stale: Vec<_> = {
            let mut idle = lock(&self.idle);
            let (keep, stale) = std::mem::take(&mut *idle)
                .into_iter()
                .partition(|conn| conn.is_healthy());
            *idle = keep;
            stale
        };
        let count = stale.len();
        self.discard_stale(stale);
        count
    }

    /// Spawn the maintenance task: keep `min_idle` warm and reap every
    /// `reap_interval`. Does nothing outside a Tokio runtime.
    ///
    /// The task holds only a weak reference and stops once the pool is
    /// closed or dropped.
    pub fn start(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(addr = %self.addr, "No Tokio runtime, pool maintenance disabled");
            return;
        };

        let weak = Arc::downgrade(self);
        let every = self.options.reap_interval;
        handle.spawn(async move {
            let mut ticker = time::interval(every);
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                if pool.is_closed() {
                    break;
                }

                let reaped = pool.reap();
                if reaped > 0 {
                    tracing::debug!(addr = %pool.addr, reaped, "Reaped stale idle connections");
                }
                if let Err(e) = pool.fill_min_idle().await {
                    tracing::warn!(addr = %pool.addr, error = %e, "Failed to refill idle connections");
                }
            }
        });
    }

    fn idle_len(&self) -> usize {
        lock(&self.idle).len()
    }

    fn discard_stale(&self, conns: Vec<Connection<T>>) {
        for conn in conns {
            self.counters.stale.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(addr = %self.addr, connection_id = %conn.id(), age = ?conn.age(), "Evicting stale connection");
            self.close_conn(conn);
        }
    }

    fn close_conn(&self, conn: Connection<T>) {
        let id = conn.id();
        if let Err(e) = conn.close() {
            tracing::warn!(addr = %self.addr, connection_id = %id, error = %e, "Error closing connection");
        }
    }

    fn closed_error(&self) -> PoolError {
        PoolError::Closed {
            addr: self.addr.clone(),
        }
    }
}

impl<T: Channel> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("addr", &self.addr)
            .field("options", &self.options)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
