//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! LoadBalance::select(ctx)
//!     → base.rs (read-lock the endpoint list, fail fast if closed/empty)
//!     → Apply the strategy:
//!         - round_robin.rs (rotate through endpoints)
//!         - weighted_round_robin.rs (smooth weighted interleaving)
//!         - consistent_hash.rs (ring lookup by routing key)
//!         - least_conn.rs (fewest active, optionally per weight)
//!         - shortest_expected_delay.rs ((active + 1) / weight)
//!         - never_queue.rs (idle endpoint first)
//!     → Endpoint returned; the caller acquires a connection from it
//! ```
//!
//! # Design Decisions
//! - Selection never touches pool state; acquiring is a separate step
//! - Endpoints are compared by identity, not by address
//! - The strategy is picked once at construction time from a `BalanceType`

pub mod base;
pub mod builder;
pub mod consistent_hash;
pub mod endpoint;
pub mod least_conn;
pub mod never_queue;
pub mod round_robin;
pub mod shortest_expected_delay;
pub mod weighted_round_robin;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::str::FromStr;

use crate::error::{BalanceError, UnknownBalanceType};
use crate::observability::metrics;
use crate::pool::Channel;

pub use base::BaseLoadBalance;
pub use builder::{build_from_config, build_load_balance, empty_load_balance, new_load_balance};
pub use consistent_hash::ConsistentHash;
pub use endpoint::{same_endpoint, Endpoint, EndpointMeta, EndpointRef, EndpointServer, PooledEndpoint};
pub use least_conn::LeastConnections;
pub use never_queue::NeverQueue;
pub use round_robin::RoundRobin;
pub use shortest_expected_delay::ShortestExpectedDelay;
pub use weighted_round_robin::WeightedRoundRobin;

/// Strategy identifier, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BalanceType {
    /// Round robin.
    #[default]
    RR,
    /// Smooth weighted round robin.
    WRR,
    /// Consistent hash on a routing key.
    CH,
    /// Least connections.
    LC,
    /// Weighted least connections.
    WLC,
    /// Shortest expected delay.
    SED,
    /// Never queue.
    NQ,
}

impl BalanceType {
    pub const ALL: [BalanceType; 7] = [
        BalanceType::RR,
        BalanceType::WRR,
        BalanceType::CH,
        BalanceType::LC,
        BalanceType::WLC,
        BalanceType::SED,
        BalanceType::NQ,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceType::RR => "RR",
            BalanceType::WRR => "WRR",
            BalanceType::CH => "CH",
            BalanceType::LC => "LC",
            BalanceType::WLC => "WLC",
            BalanceType::SED => "SED",
            BalanceType::NQ => "NQ",
        }
    }

    /// Lenient parse used at construction: blank or unknown codes mean `RR`.
    pub fn from_code(code: &str) -> Self {
        match code.parse::<BalanceType>() {
            Ok(kind) => kind,
            Err(UnknownBalanceType(code)) => {
                if !code.trim().is_empty() {
                    tracing::warn!(code = %code, "Unknown balance type, using RR");
                }
                BalanceType::RR
            }
        }
    }
}

impl fmt::Display for BalanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceType {
    type Err = UnknownBalanceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BalanceType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownBalanceType(s.to_string()))
    }
}

/// Whether `code` names a known strategy.
pub fn check_balance_type(code: &str) -> bool {
    code.parse::<BalanceType>().is_ok()
}

/// Per-call selection input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionContext {
    routing_key: Option<String>,
}

impl SelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying a routing key (typically the caller's source IP).
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            routing_key: Some(key.into()),
        }
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.routing_key.as_deref()
    }
}

/// A set of endpoints plus a strategy for choosing among them.
///
/// Implementations compose a [`BaseLoadBalance`]; the default methods
/// delegate to it.
pub trait LoadBalance<T: Channel>: Send + Sync {
    fn base(&self) -> &BaseLoadBalance<T>;

    fn kind(&self) -> BalanceType;

    /// Pick an endpoint. Fails with `Closed` once closed and `NoEndpoint`
    /// when the set is empty.
    fn select(&self, ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError>;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn add_endpoint(&self, endpoint: EndpointRef<T>) -> Result<(), BalanceError> {
        self.base().add_endpoint(endpoint)
    }

    /// Remove `endpoint` by identity. The endpoint is not closed. Returns
    /// false if it is absent or the balancer is closed.
    fn remove_endpoint(&self, endpoint: &EndpointRef<T>) -> bool {
        self.base().remove_endpoint(endpoint)
    }

    fn endpoints(&self) -> Vec<EndpointRef<T>> {
        self.base().endpoints()
    }

    fn close(&self) -> Result<(), BalanceError> {
        self.base().close()
    }

    fn is_closed(&self) -> bool {
        self.base().is_closed()
    }
}

/// Record a selection and hand the endpoint back.
pub(crate) fn selected<T: Channel>(
    kind: BalanceType,
    balancer: &str,
    endpoint: &EndpointRef<T>,
) -> EndpointRef<T> {
    tracing::trace!(balancer = %balancer, strategy = %kind, addr = %endpoint.addr(), "Endpoint selected");
    metrics::record_selection(kind.as_str(), endpoint.addr());
    endpoint.clone()
}
