//! Endpoint-set management shared by every strategy.
//!
//! # Responsibilities
//! - Own the ordered endpoint list behind a read/write lock
//! - Add and remove endpoints (removal by identity)
//! - Close every endpoint exactly once
//!
//! # Design Decisions
//! - Selection takes the read lock, mutation the write lock; neither is
//!   held while a connection is being acquired
//! - Removing an endpoint does not close it: the caller owns its lifecycle
//! - Only the caller that flips the closed flag tears endpoints down

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::BalanceError;
use crate::load_balancer::endpoint::{same_endpoint, EndpointRef};
use crate::pool::Channel;

/// Endpoint list, name and closed flag composed into every strategy.
pub struct BaseLoadBalance<T: Channel> {
    name: String,
    endpoints: RwLock<Vec<EndpointRef<T>>>,
    closed: AtomicBool,
}

impl<T: Channel> BaseLoadBalance<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn add_endpoint(&self, endpoint: EndpointRef<T>) -> Result<(), BalanceError> {
        self.add_endpoint_with(endpoint, |_| {})
    }

    /// Append `endpoint`, then run `after` on the new list under the same write lock.
    pub fn add_endpoint_with(
        &self,
        endpoint: EndpointRef<T>,
        after: impl FnOnce(&[EndpointRef<T>]),
    ) -> Result<(), BalanceError> {
        let mut endpoints = self.write();
        if self.is_closed() {
            return Err(BalanceError::Closed);
        }
        tracing::debug!(balancer = %self.name, addr = %endpoint.addr(), "Endpoint added");
        endpoints.push(endpoint);
        after(&endpoints);
        Ok(())
    }

    /// Remove the first endpoint identical to `endpoint`. Returns false if
    /// absent or once closed.
    pub fn remove_endpoint(&self, endpoint: &EndpointRef<T>) -> bool {
        self.remove_endpoint_with(endpoint, |_, _| {})
    }

    /// Like [`remove_endpoint`](Self::remove_endpoint); `after` receives the
    /// removed index and the remaining list, under the same write lock.
    pub fn remove_endpoint_with(
        &self,
        endpoint: &EndpointRef<T>,
        after: impl FnOnce(usize, &[EndpointRef<T>]),
    ) -> bool {
        let mut endpoints = self.write();
        if self.is_closed() {
            return false;
        }
        let Some(index) = endpoints.iter().position(|e| same_endpoint(e, endpoint)) else {
            return false;
        };
        endpoints.remove(index);
        tracing::debug!(balancer = %self.name, addr = %endpoint.addr(), "Endpoint removed");
        after(index, &endpoints);
        true
    }

    /// Copy of the current endpoint list.
    pub fn endpoints(&self) -> Vec<EndpointRef<T>> {
        self.read().clone()
    }

    /// Run a selection over the endpoint list under the read lock.
    ///
    /// Fails with `Closed` once closed and with `NoEndpoint` when the list is empty.
    pub fn with_endpoints<R>(
        &self,
        select: impl FnOnce(&[EndpointRef<T>]) -> R,
    ) -> Result<R, BalanceError> {
        if self.is_closed() {
            return Err(BalanceError::Closed);
        }
        let endpoints = self.read();
        if endpoints.is_empty() {
            return Err(BalanceError::NoEndpoint);
        }
        Ok(select(&endpoints))
    }

    /// Close every endpoint, once.
    ///
    /// The first caller closes endpoints in order and stops at the first
    /// error, which it returns. Every other caller returns `Ok(())`.
    pub fn close(&self) -> Result<(), BalanceError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let endpoints = self.endpoints();
        tracing::info!(balancer = %self.name, endpoints = endpoints.len(), "Closing load balancer");
        for endpoint in endpoints {
            endpoint.close()?;
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EndpointRef<T>>> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EndpointRef<T>>> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::testing::stubs;
    use std::sync::Arc;

    #[test]
    fn add_and_remove_by_identity() {
        let (_, refs) = stubs(&[("a", None), ("a", None)]);
        let base = BaseLoadBalance::new("test");
        base.add_endpoint(refs[0].clone()).unwrap();
        base.add_endpoint(refs[1].clone()).unwrap();

        assert!(base.remove_endpoint(&refs[1]));
        let left = base.endpoints();
        assert_eq!(left.len(), 1);
        assert!(same_endpoint(&left[0], &refs[0]));

        // already gone
        assert!(!base.remove_endpoint(&refs[1]));
    }

    #[test]
    fn endpoints_is_a_snapshot() {
        let (_, refs) = stubs(&[("a", None), ("b", None)]);
        let base = BaseLoadBalance::new("test");
        base.add_endpoint(refs[0].clone()).unwrap();

        let snapshot = base.endpoints();
        base.add_endpoint(refs[1].clone()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(base.endpoints().len(), 2);
    }

    #[test]
    fn remove_does_not_close() {
        let (stubs, refs) = stubs(&[("a", None)]);
        let base = BaseLoadBalance::new("test");
        base.add_endpoint(refs[0].clone()).unwrap();
        base.remove_endpoint(&refs[0]);
        assert_eq!(stubs[0].closes(), 0);
    }

    #[test]
    fn concurrent_close_tears_down_once() {
        let (stubs, refs) = stubs(&[("a", None), ("b", None), ("c", None)]);
        let base = Arc::new(BaseLoadBalance::new("test"));
        for r in &refs {
            base.add_endpoint(r.clone()).unwrap();
        }

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let base = base.clone();
                std::thread::spawn(move || base.close())
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }

        for s in &stubs {
            assert_eq!(s.closes(), 1);
        }
        assert!(matches!(base.with_endpoints(|_| ()), Err(BalanceError::Closed)));
        assert!(matches!(base.add_endpoint(refs[0].clone()), Err(BalanceError::Closed)));
        assert!(!base.remove_endpoint(&refs[0]));
        assert_eq!(base.endpoints().len(), 3);
    }

    #[test]
    fn close_stops_at_first_error() {
        let (stubs, refs) = stubs(&[("a", None), ("b", None), ("c", None)]);
        stubs[1].fail_on_close();
        let base = BaseLoadBalance::new("test");
        for r in &refs {
            base.add_endpoint(r.clone()).unwrap();
        }

        assert!(matches!(base.close(), Err(BalanceError::Pool(_))));
        assert_eq!(stubs[0].closes(), 1);
        assert_eq!(stubs[1].closes(), 1);
        assert_eq!(stubs[2].closes(), 0);
        // the flag is already set, nothing is closed again
        assert!(base.close().is_ok());
        assert_eq!(stubs[0].closes(), 1);
    }

    #[test]
    fn empty_set_has_no_endpoint() {
        let base: BaseLoadBalance<crate::load_balancer::testing::NoopChannel> = BaseLoadBalance::new("test");
        assert!(matches!(base.with_endpoints(|_| ()), Err(BalanceError::NoEndpoint)));
    }
}
