//! Balancer construction.
//!
//! # Data Flow
//! ```text
//! ServerConfig (name, lb, endpoints) + PoolConfig
//!     → BalanceType::from_code (blank/unknown → RR)
//!     → one Pool + PooledEndpoint per (addr, weight)
//!     → strategy with every endpoint added, in config order
//! ```

use std::sync::Arc;

use crate::config::{PoolConfig, ServerConfig};
use crate::error::BalanceError;
use crate::load_balancer::{
    BalanceType, ConsistentHash, EndpointRef, EndpointServer, LeastConnections, LoadBalance,
    NeverQueue, PooledEndpoint, RoundRobin, ShortestExpectedDelay, WeightedRoundRobin,
};
use crate::pool::{Channel, Dial, PoolOptions};

/// Empty strategy of the given kind. A blank name becomes the strategy code.
pub fn empty_load_balance<T: Channel>(name: &str, kind: BalanceType) -> Arc<dyn LoadBalance<T>> {
    let name = if name.trim().is_empty() { kind.as_str() } else { name };
    match kind {
        BalanceType::RR => Arc::new(RoundRobin::new(name)),
        BalanceType::WRR => Arc::new(WeightedRoundRobin::new(name)),
        BalanceType::CH => Arc::new(ConsistentHash::new(name)),
        BalanceType::LC => Arc::new(LeastConnections::new(name)),
        BalanceType::WLC => Arc::new(LeastConnections::weighted(name)),
        BalanceType::SED => Arc::new(ShortestExpectedDelay::new(name)),
        BalanceType::NQ => Arc::new(NeverQueue::new(name)),
    }
}

/// Strategy of the given kind holding `endpoints`, in order.
pub fn new_load_balance<T: Channel>(
    name: &str,
    kind: BalanceType,
    endpoints: impl IntoIterator<Item = EndpointRef<T>>,
) -> Result<Arc<dyn LoadBalance<T>>, BalanceError> {
    let lb = empty_load_balance(name, kind);
    for endpoint in endpoints {
        lb.add_endpoint(endpoint)?;
    }
    Ok(lb)
}

/// Fully wired balancer: one pool per `(addr, weight)`, dialed with `dial`.
///
/// `code` is a balance type code; blank or unknown codes mean round robin.
pub fn build_load_balance<T: Channel>(
    name: &str,
    code: &str,
    servers: &[EndpointServer],
    dial: Arc<dyn Dial<T>>,
    options: PoolOptions,
) -> Result<Arc<dyn LoadBalance<T>>, BalanceError> {
    let kind = BalanceType::from_code(code);
    let endpoints = servers.iter().map(|server| {
        Arc::new(PooledEndpoint::connect(server, dial.clone(), options)) as EndpointRef<T>
    });
    let lb = new_load_balance(name, kind, endpoints)?;

    tracing::info!(
        balancer = %lb.name(),
        strategy = %kind,
        endpoints = servers.len(),
        "Load balancer built"
    );
    Ok(lb)
}

/// [`build_load_balance`] from a server section and the shared pool section.
pub fn build_from_config<T: Channel>(
    server: &ServerConfig,
    pool: &PoolConfig,
    dial: Arc<dyn Dial<T>>,
) -> Result<Arc<dyn LoadBalance<T>>, BalanceError> {
    build_load_balance(&server.name, &server.lb, &server.endpoints, dial, pool.to_options())
}
