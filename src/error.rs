//! Error types shared by the pool and the balancers.

use std::time::Duration;
use thiserror::Error;

/// Opaque error produced by a transport collaborator (dial or channel close).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by a connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was closed; it will never hand out connections again.
    #[error("connection pool for {addr} is closed")]
    Closed { addr: String },

    /// No connection could be acquired before the deadline.
    #[error("connection pool for {addr} exhausted: no connection within {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// The dialer failed to establish a new connection.
    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: BoxError,
    },

    /// A channel reported an error while being closed.
    #[error("failed to close connection to {addr}: {source}")]
    Close {
        addr: String,
        #[source]
        source: BoxError,
    },
}

impl PoolError {
    /// True when the pool ran out of capacity before the deadline.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Timeout { .. })
    }
}

/// Errors returned by a load balancer.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// The balancer holds no endpoints.
    #[error("no endpoint available")]
    NoEndpoint,

    /// A consistent-hash selection was made without a routing key.
    #[error("no source ip")]
    NoSourceIp,

    /// The balancer was closed.
    #[error("load balancer is closed")]
    Closed,

    /// Closing or using an endpoint's pool failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// A balance-type code outside the recognised set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown balance type: {0:?}")]
pub struct UnknownBalanceType(pub String);
