//! Never Queue load balancing strategy.
//!
//! Sends work to the first idle endpoint (no active connections) in set
//! order. When every endpoint is busy it falls back to least connections.

use crate::error::BalanceError;
use crate::load_balancer::least_conn::{active_of, min_by_ratio, Ratio};
use crate::load_balancer::{selected, BalanceType, BaseLoadBalance, EndpointRef, LoadBalance, SelectionContext};
use crate::pool::Channel;

pub struct NeverQueue<T: Channel> {
    base: BaseLoadBalance<T>,
}

impl<T: Channel> NeverQueue<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseLoadBalance::new(name),
        }
    }
}

impl<T: Channel> LoadBalance<T> for NeverQueue<T> {
    fn base(&self) -> &BaseLoadBalance<T> {
        &self.base
    }

    fn kind(&self) -> BalanceType {
        BalanceType::NQ
    }

    fn select(&self, _ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError> {
        self.base.with_endpoints(|endpoints| {
            let index = endpoints
                .iter()
                .position(|e| active_of(e) == 0)
                .unwrap_or_else(|| min_by_ratio(endpoints, |e| Ratio::new(active_of(e), 1)));
            selected(self.kind(), self.base.name(), &endpoints[index])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::endpoint::same_endpoint;
    use crate::load_balancer::testing::stubs;

    #[test]
    fn test_idle_endpoint_first() {
        let (stubs, refs) = stubs(&[("a", Some(10)), ("b", Some(1)), ("c", Some(1))]);
        let nq = NeverQueue::new("nq");
        for r in &refs {
            nq.add_endpoint(r.clone()).unwrap();
        }
        stubs[0].set_active(1);

        // b is idle, even though a is far heavier
        assert!(same_endpoint(&nq.select(&SelectionContext::new()).unwrap(), &refs[1]));
    }

    #[test]
    fn test_all_busy_falls_back_to_least_active() {
        let (stubs, refs) = stubs(&[("a", None), ("b", None), ("c", None)]);
        let nq = NeverQueue::new("nq");
        for r in &refs {
            nq.add_endpoint(r.clone()).unwrap();
        }
        stubs[0].set_active(4);
        stubs[1].set_active(2);
        stubs[2].set_active(3);

        assert!(same_endpoint(&nq.select(&SelectionContext::new()).unwrap(), &refs[1]));
    }
}
