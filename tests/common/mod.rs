//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rpc_balancer::pool::Dial;
use rpc_balancer::{BoxError, Channel};

/// In-memory channel with a switchable ready flag and a close counter.
#[derive(Debug)]
pub struct MockChannel {
    pub addr: String,
    pub ready: Arc<AtomicBool>,
    closes: Arc<AtomicUsize>,
}

impl Channel for MockChannel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Dialer that counts dials and closes, optionally failing or stalling.
#[derive(Debug, Clone, Default)]
pub struct MockDialer {
    dials: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dial sleeps `delay` first.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn shared(&self) -> Arc<dyn Dial<MockChannel>> {
        Arc::new(self.clone())
    }
}

#[async_trait::async_trait]
impl Dial<MockChannel> for MockDialer {
    async fn dial(&self, addr: &str) -> Result<MockChannel, BoxError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(format!("connection refused: {addr}").into());
        }
        self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(MockChannel {
            addr: addr.to_string(),
            ready: Arc::new(AtomicBool::new(true)),
            closes: self.closes.clone(),
        })
    }
}
