//! Client-side load balancing and connection pooling for RPC clients.
//!
//! A [`LoadBalance`](load_balancer::LoadBalance) picks an
//! [`Endpoint`](load_balancer::Endpoint) with one of seven strategies; each
//! endpoint owns a bounded [`Pool`](pool::Pool) of transport connections.

pub mod config;
pub mod error;
pub mod load_balancer;
pub mod observability;
pub mod pool;

pub use config::BalancerConfig;
pub use error::{BalanceError, BoxError, PoolError};
pub use load_balancer::{
    build_from_config, build_load_balance, check_balance_type, new_load_balance, BalanceType,
    Endpoint, EndpointRef, EndpointServer, LoadBalance, SelectionContext,
};
pub use pool::{Channel, Connection, Dial, Pool, PoolOptions, PoolStats};
