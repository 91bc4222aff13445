//! Pooled connection wrapper and its lifecycle guards.
//!
//! # Responsibilities
//! - Wrap a raw transport channel with creation / last-used timestamps
//! - Decide whether a connection is still fit for reuse
//! - Give every connection a unique id for tracing
//! - Return pool capacity when a connection is dropped, released or closed

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OwnedSemaphorePermit};

use crate::error::BoxError;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A raw transport handle produced by a dialer (an RPC channel, a socket...).
pub trait Channel: Send + Sync + 'static {
    /// Whether the transport can still carry requests.
    fn is_ready(&self) -> bool {
        true
    }

    /// Tear the transport down. Dropping the value must also be enough.
    fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Counters shared between a pool and the connections it created.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub open: AtomicUsize,
    pub active: AtomicUsize,
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub timeouts: AtomicU64,
    pub stale: AtomicU64,
    pub wait_count: AtomicU64,
    pub wait_nanos: AtomicU64,
    /// Signalled when a connection returns to the idle set or an open slot frees up.
    pub released: Notify,
}

/// One reserved unit of `max_open` capacity. Released on drop.
#[derive(Debug)]
pub(crate) struct OpenSlot {
    counters: Arc<PoolCounters>,
}

impl OpenSlot {
    /// Reserve a slot if fewer than `max_open` connections exist.
    pub(crate) fn try_reserve(counters: &Arc<PoolCounters>, max_open: usize) -> Option<Self> {
        let mut prev = counters.open.load(Ordering::Relaxed);
        loop {
            if prev >= max_open {
                return None;
            }
            match counters.open.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }
        Some(Self {
            counters: counters.clone(),
        })
    }
}

impl Drop for OpenSlot {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::AcqRel);
        self.counters.released.notify_one();
    }
}

/// Marks a connection as checked out. Holds one `max_active` permit.
#[derive(Debug)]
pub(crate) struct Lease {
    _permit: OwnedSemaphorePermit,
    counters: Arc<PoolCounters>,
}

impl Lease {
    pub(crate) fn new(permit: OwnedSemaphorePermit, counters: &Arc<PoolCounters>) -> Self {
        counters.active.fetch_add(1, Ordering::AcqRel);
        Self {
            _permit: permit,
            counters: counters.clone(),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A connection owned by a pool, or borrowed from it by a caller.
///
/// Dropping a `Connection` returns its capacity to the pool even if
/// [`Pool::release`](crate::pool::Pool::release) is never called.
pub struct Connection<T: Channel> {
    id: ConnectionId,
    channel: T,
    created_at: Instant,
    last_used: Instant,
    max_lifetime: Duration,
    idle_timeout: Duration,
    lease: Option<Lease>,
    slot: OpenSlot,
}

impl<T: Channel> Connection<T> {
    pub(crate) fn new(
        channel: T,
        slot: OpenSlot,
        max_lifetime: Duration,
        idle_timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            channel,
            created_at: now,
            last_used: now,
            max_lifetime,
            idle_timeout,
            lease: None,
            slot,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The underlying transport channel.
    pub fn channel(&self) -> &T {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut T {
        &mut self.channel
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Time since the connection was dialed.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Stamp the last-used time with now.
    pub fn use_at(&mut self) {
        self.last_used = Instant::now();
    }

    /// Healthy means: transport ready, not past its lifetime, not idle too long.
    pub fn is_healthy(&self) -> bool {
        self.channel.is_ready()
            && self.created_at.elapsed() < self.max_lifetime
            && self.last_used.elapsed() < self.idle_timeout
    }

    /// Close the transport and give its capacity back to the pool.
    pub fn close(self) -> Result<(), BoxError> {
        let Connection { channel, lease, slot, id, .. } = self;
        let result = channel.close();
        drop(lease);
        drop(slot);
        tracing::trace!(connection_id = %id, "Connection closed");
        result
    }

    pub(crate) fn set_lease(&mut self, lease: Lease) {
        self.lease = Some(lease);
    }

    pub(crate) fn take_lease(&mut self) -> Option<Lease> {
        self.lease.take()
    }

    pub(crate) fn belongs_to(&self, counters: &Arc<PoolCounters>) -> bool {
        Arc::ptr_eq(&self.slot.counters, counters)
    }
}

impl<T: Channel> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("age", &self.age())
            .field("leased", &self.lease.is_some())
            .finish()
    }
}

/// Stock connection-used hook: stamps the last-used time.
pub fn conn_use_at<T: Channel>(conn: &mut Connection<T>) {
    conn.use_at();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Stub {
        ready: Arc<AtomicBool>,
    }

    impl Channel for Stub {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }
    }

    fn conn(counters: &Arc<PoolCounters>, ready: Arc<AtomicBool>, idle: Duration) -> Connection<Stub> {
        let slot = OpenSlot::try_reserve(counters, 10).unwrap();
        Connection::new(Stub { ready }, slot, Duration::from_secs(60), idle)
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn open_slot_respects_limit() {
        let counters = Arc::new(PoolCounters::default());
        let a = OpenSlot::try_reserve(&counters, 2).unwrap();
        let _b = OpenSlot::try_reserve(&counters, 2).unwrap();
        assert!(OpenSlot::try_reserve(&counters, 2).is_none());

        drop(a);
        assert_eq!(counters.open.load(Ordering::SeqCst), 1);
        assert!(OpenSlot::try_reserve(&counters, 2).is_some());
    }

    #[test]
    fn health_follows_channel_and_idle_time() {
        let counters = Arc::new(PoolCounters::default());
        let ready = Arc::new(AtomicBool::new(true));

        let c = conn(&counters, ready.clone(), Duration::from_secs(60));
        assert!(c.is_healthy());
        ready.store(false, Ordering::SeqCst);
        assert!(!c.is_healthy());

        let expired = conn(&counters, Arc::new(AtomicBool::new(true)), Duration::ZERO);
        assert!(!expired.is_healthy());
    }

    #[test]
    fn close_and_drop_free_the_open_slot() {
        let counters = Arc::new(PoolCounters::default());
        let c1 = conn(&counters, Arc::new(AtomicBool::new(true)), Duration::from_secs(60));
        let c2 = conn(&counters, Arc::new(AtomicBool::new(true)), Duration::from_secs(60));
        assert_eq!(counters.open.load(Ordering::SeqCst), 2);

        c1.close().unwrap();
        assert_eq!(counters.open.load(Ordering::SeqCst), 1);

        drop(c2);
        assert_eq!(counters.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn use_at_moves_last_used_forward() {
        let counters = Arc::new(PoolCounters::default());
        let mut c = conn(&counters, Arc::new(AtomicBool::new(true)), Duration::from_secs(60));
        let before = c.last_used();
        std::thread::sleep(Duration::from_millis(2));
        conn_use_at(&mut c);
        assert!(c.last_used() > before);
    }
}
