//! In-crate stub endpoint for strategy tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::endpoint::{Endpoint, EndpointMeta, EndpointRef};
use crate::error::{BoxError, PoolError};
use crate::pool::{Channel, Connection, PoolStats};

#[derive(Debug)]
pub struct NoopChannel;

impl Channel for NoopChannel {}

/// Endpoint with a settable active count and a close counter.
#[derive(Debug)]
pub struct StubEndpoint {
    addr: String,
    weight: Option<u32>,
    active: AtomicUsize,
    closes: AtomicUsize,
    fail_close: AtomicBool,
}

impl StubEndpoint {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            weight: None,
            active: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            fail_close: AtomicBool::new(false),
        }
    }

    pub fn weighted(addr: &str, weight: u32) -> Self {
        Self {
            weight: Some(weight),
            ..Self::new(addr)
        }
    }

    pub fn set_active(&self, n: usize) {
        self.active.store(n, Ordering::SeqCst);
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn fail_on_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Endpoint for StubEndpoint {
    type Conn = NoopChannel;

    async fn get(&self) -> Result<Connection<NoopChannel>, PoolError> {
        Err(PoolError::Closed {
            addr: self.addr.clone(),
        })
    }

    fn after_transform(&self, _conn: Connection<NoopChannel>) {}

    fn stats(&self) -> PoolStats {
        PoolStats {
            active_conns: self.active.load(Ordering::SeqCst),
            ..PoolStats::default()
        }
    }

    fn addr(&self) -> &str {
        &self.addr
    }

    fn close(&self) -> Result<(), PoolError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            let source: BoxError = "stub close failure".into();
            return Err(PoolError::Close {
                addr: self.addr.clone(),
                source,
            });
        }
        Ok(())
    }

    fn meta(&self) -> Option<&dyn EndpointMeta> {
        self.weight.map(|_| self as &dyn EndpointMeta)
    }
}

impl EndpointMeta for StubEndpoint {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn weight(&self) -> u32 {
        self.weight.unwrap_or(1)
    }
}

/// Build stubs and their type-erased handles side by side.
pub fn stubs(specs: &[(&str, Option<u32>)]) -> (Vec<Arc<StubEndpoint>>, Vec<EndpointRef<NoopChannel>>) {
    let stubs: Vec<Arc<StubEndpoint>> = specs
        .iter()
        .map(|(addr, weight)| {
            Arc::new(match weight {
                Some(w) => StubEndpoint::weighted(addr, *w),
                None => StubEndpoint::new(addr),
            })
        })
        .collect();
    let refs = stubs
        .iter()
        .map(|s| s.clone() as EndpointRef<NoopChannel>)
        .collect();
    (stubs, refs)
}
