//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BalanceError;
use crate::load_balancer::{selected, BalanceType, BaseLoadBalance, EndpointRef, LoadBalance, SelectionContext};
use crate::pool::Channel;

/// Round-robin selector.
/// Stores an internal counter to rotate through endpoints.
///
/// The index is taken modulo the length at selection time, so removing an
/// endpoint can make the rotation skip one.
pub struct RoundRobin<T: Channel> {
    base: BaseLoadBalance<T>,
    counter: AtomicUsize,
}

impl<T: Channel> RoundRobin<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseLoadBalance::new(name),
            counter: AtomicUsize::new(0),
        }
    }
}

impl<T: Channel> LoadBalance<T> for RoundRobin<T> {
    fn base(&self) -> &BaseLoadBalance<T> {
        &self.base
    }

    fn kind(&self) -> BalanceType {
        BalanceType::RR
    }

    fn select(&self, _ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError> {
        self.base.with_endpoints(|endpoints| {
            let index = self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len();
            selected(self.kind(), self.base.name(), &endpoints[index])
        })
    }
}
