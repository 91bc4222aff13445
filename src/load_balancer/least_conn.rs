//! Least Connections load balancing strategies (LC and WLC).
//!
//! Load is read from each endpoint's pool stats at selection time. Ratios
//! are compared by cross-multiplication, so no floating point is involved.

use std::cmp::Ordering;

use crate::error::BalanceError;
use crate::load_balancer::endpoint::weight_of;
use crate::load_balancer::{selected, BalanceType, BaseLoadBalance, EndpointRef, LoadBalance, SelectionContext};
use crate::pool::Channel;

/// Load metric `num / den`, with `den >= 1`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ratio {
    pub num: u64,
    pub den: u64,
}

impl Ratio {
    pub(crate) fn new(num: u64, den: u64) -> Self {
        Self { num, den: den.max(1) }
    }

    pub(crate) fn compare(&self, other: &Ratio) -> Ordering {
        (self.num as u128 * other.den as u128).cmp(&(other.num as u128 * self.den as u128))
    }
}

pub(crate) fn active_of<T: Channel>(endpoint: &EndpointRef<T>) -> u64 {
    endpoint.stats().active_conns as u64
}

/// Index of the endpoint with the smallest metric; ties go to the first.
pub(crate) fn min_by_ratio<T: Channel>(
    endpoints: &[EndpointRef<T>],
    metric: impl Fn(&EndpointRef<T>) -> Ratio,
) -> usize {
    let mut best = 0;
    let mut best_load = metric(&endpoints[0]);
    for (i, endpoint) in endpoints.iter().enumerate().skip(1) {
        let load = metric(endpoint);
        if load.compare(&best_load) == Ordering::Less {
            best = i;
            best_load = load;
        }
    }
    best
}

/// Least connections selector.
/// Selects the endpoint with the minimum number of active connections,
/// divided by its weight when `weighted` (WLC).
pub struct LeastConnections<T: Channel> {
    base: BaseLoadBalance<T>,
    weighted: bool,
}

impl<T: Channel> LeastConnections<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseLoadBalance::new(name),
            weighted: false,
        }
    }

    /// Weighted variant: minimises `active / weight`.
    pub fn weighted(name: impl Into<String>) -> Self {
        Self {
            base: BaseLoadBalance::new(name),
            weighted: true,
        }
    }
}

impl<T: Channel> LoadBalance<T> for LeastConnections<T> {
    fn base(&self) -> &BaseLoadBalance<T> {
        &self.base
    }

    fn kind(&self) -> BalanceType {
        if self.weighted {
            BalanceType::WLC
        } else {
            BalanceType::LC
        }
    }

    fn select(&self, _ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError> {
        self.base.with_endpoints(|endpoints| {
            let index = if self.weighted {
                min_by_ratio(endpoints, |e| Ratio::new(active_of(e), weight_of(e)))
            } else {
                min_by_ratio(endpoints, |e| Ratio::new(active_of(e), 1))
            };
            selected(self.kind(), self.base.name(), &endpoints[index])
        })
    }
}
