//! Smooth weighted round-robin load balancing strategy.
//!
//! Every selection adds each endpoint's weight to its current weight,
//! picks the largest current weight and subtracts the total weight from
//! it. Over any window of `sum(weights)` selections endpoint `i` is chosen
//! exactly `weight[i]` times, interleaved rather than in bursts
//! (weights 3 and 1 give A, A, B, A).

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::BalanceError;
use crate::load_balancer::endpoint::weight_of;
use crate::load_balancer::{selected, BalanceType, BaseLoadBalance, EndpointRef, LoadBalance, SelectionContext};
use crate::pool::Channel;

/// Smooth weighted round-robin selector.
///
/// Current weights are kept index-aligned with the endpoint list; they are
/// resized under the endpoint write lock, then the state lock.
pub struct WeightedRoundRobin<T: Channel> {
    base: BaseLoadBalance<T>,
    current: Mutex<Vec<i64>>,
}

impl<T: Channel> WeightedRoundRobin<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseLoadBalance::new(name),
            current: Mutex::new(Vec::new()),
        }
    }

    fn current(&self) -> MutexGuard<'_, Vec<i64>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Channel> LoadBalance<T> for WeightedRoundRobin<T> {
    fn base(&self) -> &BaseLoadBalance<T> {
        &self.base
    }

    fn kind(&self) -> BalanceType {
        BalanceType::WRR
    }

    fn select(&self, _ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError> {
        self.base.with_endpoints(|endpoints| {
            let mut current = self.current();
            current.resize(endpoints.len(), 0);

            let mut total = 0i64;
            let mut best = 0;
            for (i, endpoint) in endpoints.iter().enumerate() {
                let weight = weight_of(endpoint) as i64;
                total += weight;
                current[i] += weight;
                // strict: ties go to the earlier endpoint
                if current[i] > current[best] {
                    best = i;
                }
            }
            current[best] -= total;

            selected(self.kind(), self.base.name(), &endpoints[best])
        })
    }

    fn add_endpoint(&self, endpoint: EndpointRef<T>) -> Result<(), BalanceError> {
        self.base
            .add_endpoint_with(endpoint, |endpoints| self.current().resize(endpoints.len(), 0))
    }

    fn remove_endpoint(&self, endpoint: &EndpointRef<T>) -> bool {
        self.base.remove_endpoint_with(endpoint, |index, _| {
            let mut current = self.current();
            if index < current.len() {
                current.remove(index);
            }
        })
    }
}
