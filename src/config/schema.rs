//! Configuration schema definitions.
//!
//! This module defines the configuration structure for pools and balanced
//! servers. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::load_balancer::{BalanceType, EndpointServer};
use crate::pool::PoolOptions;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BalancerConfig {
    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Pool limits shared by every endpoint.
    pub pool: PoolConfig,

    /// Balanced server groups.
    pub servers: Vec<ServerConfig>,
}

impl BalancerConfig {
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Connection pool limits. Zero means the library default.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool size, used for `max_open_conns` when that is unset.
    pub size: usize,

    pub max_open_conns: usize,

    pub max_idle_conns: usize,

    pub min_idle_conns: usize,

    pub max_active_conns: usize,

    /// Acquire timeout in seconds.
    pub timeout: u64,

    /// Idle lifetime of a connection in seconds.
    pub idle_timeout: u64,

    /// Maximum age of a connection in seconds.
    pub max_lifetime: u64,
}

impl PoolConfig {
    /// Effective `max_open`, before defaults are applied.
    pub fn max_open(&self) -> usize {
        if self.max_open_conns > 0 {
            self.max_open_conns
        } else {
            self.size
        }
    }

    /// Resolve into pool options.
    pub fn to_options(&self) -> PoolOptions {
        PoolOptions::default()
            .with_max_open(self.max_open())
            .with_max_idle(self.max_idle_conns)
            .with_min_idle(self.min_idle_conns)
            .with_max_active(self.max_active_conns)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_idle_timeout(Duration::from_secs(self.idle_timeout))
            .with_max_lifetime(Duration::from_secs(self.max_lifetime))
            .normalized()
    }
}

/// A balanced server group.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Unique server identifier; also the balancer name.
    pub name: String,

    /// Caller-defined ordering between servers (higher = preferred).
    #[serde(default)]
    pub priority: u32,

    /// Per-request timeout in seconds (0 = none).
    #[serde(default)]
    pub timeout: u64,

    /// Balance type code (RR, WRR, CH, LC, WLC, SED, NQ). Blank means RR.
    #[serde(default)]
    pub lb: String,

    /// Endpoints of this server.
    #[serde(default)]
    pub endpoints: Vec<EndpointServer>,
}

impl ServerConfig {
    pub fn balance_type(&self) -> BalanceType {
        BalanceType::from_code(&self.lb)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}
