//! Shortest Expected Delay load balancing strategy.
//!
//! Picks the endpoint minimising `(active + 1) / weight`: the expected
//! delay of the next request if it were sent there.

use crate::error::BalanceError;
use crate::load_balancer::endpoint::weight_of;
use crate::load_balancer::least_conn::{active_of, min_by_ratio, Ratio};
use crate::load_balancer::{selected, BalanceType, BaseLoadBalance, EndpointRef, LoadBalance, SelectionContext};
use crate::pool::Channel;

pub struct ShortestExpectedDelay<T: Channel> {
    base: BaseLoadBalance<T>,
}

impl<T: Channel> ShortestExpectedDelay<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            base: BaseLoadBalance::new(name),
        }
    }
}

impl<T: Channel> LoadBalance<T> for ShortestExpectedDelay<T> {
    fn base(&self) -> &BaseLoadBalance<T> {
        &self.base
    }

    fn kind(&self) -> BalanceType {
        BalanceType::SED
    }

    fn select(&self, _ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError> {
        self.base.with_endpoints(|endpoints| {
            let index = min_by_ratio(endpoints, |e| Ratio::new(active_of(e) + 1, weight_of(e)));
            selected(self.kind(), self.base.name(), &endpoints[index])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::endpoint::same_endpoint;
    use crate::load_balancer::testing::{stubs, NoopChannel};
    use crate::load_balancer::LeastConnections;

    #[test]
    fn test_differs_from_wlc_by_one() {
        // A: 0 active, weight 1 -> WLC 0, SED 1
        // B: 1 active, weight 4 -> WLC 1/4, SED 2/4
        let (stubs, refs) = stubs(&[("A", Some(1)), ("B", Some(4))]);
        stubs[1].set_active(1);

        let sed = ShortestExpectedDelay::new("sed");
        let wlc = LeastConnections::weighted("wlc");
        for r in &refs {
            sed.add_endpoint(r.clone()).unwrap();
            wlc.add_endpoint(r.clone()).unwrap();
        }

        let ctx = SelectionContext::new();
        assert!(same_endpoint(&wlc.select(&ctx).unwrap(), &refs[0]));
        assert!(same_endpoint(&sed.select(&ctx).unwrap(), &refs[1]));
    }

    #[test]
    fn test_ties_go_to_first() {
        let (_, refs) = stubs(&[("A", Some(2)), ("B", Some(2))]);
        let sed = ShortestExpectedDelay::new("sed");
        for r in &refs {
            sed.add_endpoint(r.clone()).unwrap();
        }
        assert!(same_endpoint(&sed.select(&SelectionContext::new()).unwrap(), &refs[0]));
    }

    #[test]
    fn test_selected_delay_is_minimal() {
        use rand::Rng;
        use std::cmp::Ordering;

        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let specs: Vec<(String, u32)> = (0..6).map(|i| (format!("e{i}"), rng.gen_range(0..5))).collect();
            let spec_refs: Vec<(&str, Option<u32>)> =
                specs.iter().map(|(a, w)| (a.as_str(), Some(*w))).collect();
            let (stubs, refs) = stubs(&spec_refs);
            let sed = ShortestExpectedDelay::new("sed");
            for (s, r) in stubs.iter().zip(&refs) {
                s.set_active(rng.gen_range(0..10));
                sed.add_endpoint(r.clone()).unwrap();
            }

            let picked = sed.select(&SelectionContext::new()).unwrap();
            let delay = |e: &EndpointRef<NoopChannel>| Ratio::new(active_of(e) + 1, weight_of(e));
            for r in &refs {
                assert_ne!(delay(&picked).compare(&delay(r)), Ordering::Greater);
            }
        }
    }

    #[test]
    fn test_empty_set() {
        let sed: ShortestExpectedDelay<NoopChannel> = ShortestExpectedDelay::new("sed");
        assert!(matches!(sed.select(&SelectionContext::new()), Err(BalanceError::NoEndpoint)));
    }
}
