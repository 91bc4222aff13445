//! Consistent-hash load balancing strategy.
//!
//! # Responsibilities
//! - Place `replicas` virtual nodes per endpoint on a 64-bit hash ring
//! - Map a routing key to the first virtual node at or after its hash
//!
//! # Design Decisions
//! - The ring is rebuilt on every add/remove (under the endpoint write lock)
//!   and published with `ArcSwap`, so readers see the old or the new ring,
//!   never a partial one
//! - Virtual node positions depend only on the endpoint address, so
//!   removing an endpoint moves only the keys it owned
//! - Hashes use `DefaultHasher`, stable for the life of the process only

use arc_swap::ArcSwap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::BalanceError;
use crate::load_balancer::{selected, BalanceType, BaseLoadBalance, EndpointRef, LoadBalance, SelectionContext};
use crate::pool::Channel;

/// Virtual nodes per endpoint when not configured.
pub const DEFAULT_REPLICAS: usize = 4;

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Immutable sorted ring of virtual nodes.
struct Ring<T: Channel> {
    points: Vec<(u64, EndpointRef<T>)>,
}

impl<T: Channel> Ring<T> {
    fn empty() -> Self {
        Self { points: Vec::new() }
    }

    fn build(endpoints: &[EndpointRef<T>], replicas: usize) -> Self {
        let mut points = Vec::with_capacity(endpoints.len() * replicas);
        for endpoint in endpoints {
            for i in 0..replicas {
                let hash = hash_key(&format!("{}#{}", endpoint.addr(), i));
                points.push((hash, endpoint.clone()));
            }
        }
        // stable: on a collision the earlier endpoint owns the point
        points.sort_by_key(|(hash, _)| *hash);
        Self { points }
    }

    fn lookup(&self, hash: u64) -> Option<&EndpointRef<T>> {
        if self.points.is_empty() {
            return None;
        }
        let mut index = self.points.partition_point(|(point, _)| *point < hash);
        if index == self.points.len() {
            index = 0;
        }
        Some(&self.points[index].1)
    }
}

/// Consistent-hash selector. Requires a routing key in the selection context.
pub struct ConsistentHash<T: Channel> {
    base: BaseLoadBalance<T>,
    replicas: usize,
    ring: ArcSwap<Ring<T>>,
}

impl<T: Channel> ConsistentHash<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_replicas(name, DEFAULT_REPLICAS)
    }

    /// Selector with `replicas` virtual nodes per endpoint (0 means the default).
    pub fn with_replicas(name: impl Into<String>, replicas: usize) -> Self {
        let replicas = if replicas == 0 { DEFAULT_REPLICAS } else { replicas };
        Self {
            base: BaseLoadBalance::new(name),
            replicas,
            ring: ArcSwap::from_pointee(Ring::empty()),
        }
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    fn rebuild(&self, endpoints: &[EndpointRef<T>]) {
        self.ring.store(Arc::new(Ring::build(endpoints, self.replicas)));
        tracing::debug!(
            balancer = %self.base.name(),
            endpoints = endpoints.len(),
            points = endpoints.len() * self.replicas,
            "Hash ring rebuilt"
        );
    }
}

impl<T: Channel> LoadBalance<T> for ConsistentHash<T> {
    fn base(&self) -> &BaseLoadBalance<T> {
        &self.base
    }

    fn kind(&self) -> BalanceType {
        BalanceType::CH
    }

    fn select(&self, ctx: &SelectionContext) -> Result<EndpointRef<T>, BalanceError> {
        self.base.with_endpoints(|_| -> Result<EndpointRef<T>, BalanceError> {
            let key = ctx.routing_key().ok_or(BalanceError::NoSourceIp)?;
            let ring = self.ring.load();
            let endpoint = ring.lookup(hash_key(key)).ok_or(BalanceError::NoEndpoint)?;
            Ok(selected(self.kind(), self.base.name(), endpoint))
        })?
    }

    fn add_endpoint(&self, endpoint: EndpointRef<T>) -> Result<(), BalanceError> {
        self.base.add_endpoint_with(endpoint, |endpoints| self.rebuild(endpoints))
    }

    fn remove_endpoint(&self, endpoint: &EndpointRef<T>) -> bool {
        self.base
            .remove_endpoint_with(endpoint, |_, endpoints| self.rebuild(endpoints))
    }
}
