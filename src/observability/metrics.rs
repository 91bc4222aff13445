//! Metrics emitted through the `metrics` facade.
//!
//! # Metrics
//! - `rpc_pool_dials_total` (counter): successful dials by address
//! - `rpc_pool_dial_failures_total` (counter): failed dials by address
//! - `rpc_pool_timeouts_total` (counter): gets that hit the pool timeout
//! - `rpc_pool_wait_seconds` (histogram): time spent waiting for an active slot
//! - `rpc_lb_selections_total` (counter): selections by strategy and address

use std::time::Duration;

pub fn record_dial(addr: &str) {
    metrics::counter!("rpc_pool_dials_total", "addr" => addr.to_string()).increment(1);
}

pub fn record_dial_failure(addr: &str) {
    metrics::counter!("rpc_pool_dial_failures_total", "addr" => addr.to_string()).increment(1);
}

pub fn record_pool_timeout(addr: &str) {
    metrics::counter!("rpc_pool_timeouts_total", "addr" => addr.to_string()).increment(1);
}

pub fn record_pool_wait(addr: &str, waited: Duration) {
    metrics::histogram!("rpc_pool_wait_seconds", "addr" => addr.to_string())
        .record(waited.as_secs_f64());
}

pub fn record_selection(strategy: &'static str, addr: &str) {
    metrics::counter!(
        "rpc_lb_selections_total",
        "strategy" => strategy,
        "addr" => addr.to_string()
    )
    .increment(1);
}
