//! Endpoint abstraction.
//!
//! # Responsibilities
//! - Represent one selectable backend address
//! - Bind that address to its connection pool
//! - Expose load (pool stats) and weight to the strategies

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::PoolError;
use crate::pool::{conn_use_at, Channel, Connection, Dial, Pool, PoolOptions, PoolStats};

/// Address and weight of an endpoint, as known at construction time.
pub trait EndpointMeta {
    fn addr(&self) -> &str;
    fn weight(&self) -> u32;
}

/// A backend the balancer can select.
///
/// Endpoints are compared by identity: two endpoints with the same address
/// are still different endpoints.
#[async_trait]
pub trait Endpoint: Send + Sync {
    type Conn: Channel;

    /// Acquire a connection from this endpoint's pool.
    async fn get(&self) -> Result<Connection<Self::Conn>, PoolError>;

    /// Hand a connection back once the RPC that used it is done.
    fn after_transform(&self, conn: Connection<Self::Conn>);

    fn stats(&self) -> PoolStats;

    fn addr(&self) -> &str;

    fn close(&self) -> Result<(), PoolError>;

    /// Weight information, for endpoints that carry it.
    fn meta(&self) -> Option<&dyn EndpointMeta> {
        None
    }
}

/// Shared handle to an endpoint, as stored by the balancers.
pub type EndpointRef<T> = Arc<dyn Endpoint<Conn = T>>;

/// Identity comparison of two endpoint handles.
pub fn same_endpoint<T: Channel>(a: &EndpointRef<T>, b: &EndpointRef<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Weight used by the weighted strategies: meta weight, 1 when absent, never 0.
pub(crate) fn weight_of<T: Channel>(endpoint: &EndpointRef<T>) -> u64 {
    endpoint.meta().map_or(1, |m| m.weight()).max(1) as u64
}

/// Endpoint descriptor from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointServer {
    /// Backend address (e.g., "10.0.0.1:50051").
    pub addr: String,

    /// Weight for weighted strategies (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl EndpointServer {
    pub fn new(addr: impl Into<String>, weight: u32) -> Self {
        Self {
            addr: addr.into(),
            weight,
        }
    }
}

impl EndpointMeta for EndpointServer {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}

/// An endpoint backed by its own connection pool.
#[derive(Debug)]
pub struct PooledEndpoint<T: Channel> {
    addr: String,
    weight: u32,
    pool: Arc<Pool<T>>,
}

impl<T: Channel> PooledEndpoint<T> {
    pub fn new(addr: impl Into<String>, weight: u32, pool: Arc<Pool<T>>) -> Self {
        Self {
            addr: addr.into(),
            weight,
            pool,
        }
    }

    /// Build the pool for `server` (stamping last-used time on every get)
    /// and start its maintenance task.
    pub fn connect(server: &EndpointServer, dial: Arc<dyn Dial<T>>, options: PoolOptions) -> Self {
        let pool = Pool::new(server.addr.clone(), dial, options)
            .with_used_hook(Arc::new(conn_use_at::<T>));
        let pool = Arc::new(pool);
        pool.start();
        Self::new(server.addr.clone(), server.weight, pool)
    }

    pub fn pool(&self) -> &Arc<Pool<T>> {
        &self.pool
    }
}

#[async_trait]
impl<T: Channel> Endpoint for PooledEndpoint<T> {
    type Conn = T;

    async fn get(&self) -> Result<Connection<T>, PoolError> {
        self.pool.get().await
    }

    fn after_transform(&self, conn: Connection<T>) {
        self.pool.release(conn);
    }

    fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn addr(&self) -> &str {
        &self.addr
    }

    fn close(&self) -> Result<(), PoolError> {
        self.pool.close()
    }

    fn meta(&self) -> Option<&dyn EndpointMeta> {
        Some(self)
    }
}

impl<T: Channel> EndpointMeta for PooledEndpoint<T> {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn weight(&self) -> u32 {
        self.weight
    }
}
