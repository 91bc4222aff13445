//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pools and balancers produce:
//!     → tracing events (dials, evictions, endpoint changes, closes)
//!     → metrics.rs (counters and histograms via the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs installs a tracing subscriber for applications that want one
//!     → whatever metrics recorder the application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a metrics exporter; without a recorder the
//!   facade calls are no-ops
//! - Selection events are logged at trace level only, they are on the hot path

pub mod logging;
pub mod metrics;
