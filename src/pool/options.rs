//! Pool sizing and timeout options.
//!
//! A zero value in any field means "use the library default". It never
//! means unlimited, and never means zero capacity.

use std::time::Duration;

pub const DEFAULT_MAX_OPEN: usize = 64;
pub const DEFAULT_MAX_IDLE: usize = 16;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Limits for one connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum connections open at once (idle + checked out + dialing).
    pub max_open: usize,
    /// Maximum connections kept in the idle set.
    pub max_idle: usize,
    /// Idle connections the maintenance task keeps warm.
    pub min_idle: usize,
    /// Maximum connections checked out at once.
    pub max_active: usize,
    /// How long `get` may wait for a connection.
    pub timeout: Duration,
    /// Unused time after which a connection is evicted.
    pub idle_timeout: Duration,
    /// Age after which a connection is evicted regardless of use.
    pub max_lifetime: Duration,
    /// How often the maintenance task scans the idle set.
    pub reap_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_open: DEFAULT_MAX_OPEN,
            max_idle: DEFAULT_MAX_IDLE,
            min_idle: 0,
            max_active: DEFAULT_MAX_OPEN,
            timeout: DEFAULT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

impl PoolOptions {
    #[must_use]
    pub fn with_max_open(mut self, n: usize) -> Self {
        self.max_open = n;
        self
    }

    #[must_use]
    pub fn with_max_idle(mut self, n: usize) -> Self {
        self.max_idle = n;
        self
    }

    #[must_use]
    pub fn with_min_idle(mut self, n: usize) -> Self {
        self.min_idle = n;
        self
    }

    #[must_use]
    pub fn with_max_active(mut self, n: usize) -> Self {
        self.max_active = n;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    /// Replace zero values with defaults and clamp the limits against each other.
    ///
    /// Afterwards `max_active <= max_open`, `max_idle <= max_open` and
    /// `min_idle <= max_idle`.
    #[must_use]
    pub fn normalized(self) -> Self {
        let max_open = or_default(self.max_open, DEFAULT_MAX_OPEN);
        let max_active = or_default(self.max_active, max_open).min(max_open);
        let max_idle = or_default(self.max_idle, DEFAULT_MAX_IDLE).min(max_open);
        Self {
            max_open,
            max_idle,
            min_idle: self.min_idle.min(max_idle),
            max_active,
            timeout: or_default(self.timeout, DEFAULT_TIMEOUT),
            idle_timeout: or_default(self.idle_timeout, DEFAULT_IDLE_TIMEOUT),
            max_lifetime: or_default(self.max_lifetime, DEFAULT_MAX_LIFETIME),
            reap_interval: or_default(self.reap_interval, DEFAULT_REAP_INTERVAL),
        }
    }
}

fn or_default<V: Default + PartialEq>(value: V, default: V) -> V {
    if value == V::default() {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_means_default() {
        let zeroed = PoolOptions {
            max_open: 0,
            max_idle: 0,
            min_idle: 0,
            max_active: 0,
            timeout: Duration::ZERO,
            idle_timeout: Duration::ZERO,
            max_lifetime: Duration::ZERO,
            reap_interval: Duration::ZERO,
        };
        assert_eq!(zeroed.normalized(), PoolOptions::default());
    }

    #[test]
    fn limits_are_clamped() {
        let opts = PoolOptions::default()
            .with_max_open(4)
            .with_max_active(10)
            .with_max_idle(8)
            .with_min_idle(6)
            .normalized();

        assert_eq!(opts.max_open, 4);
        assert_eq!(opts.max_active, 4);
        assert_eq!(opts.max_idle, 4);
        assert_eq!(opts.min_idle, 4);
    }

    #[test]
    fn small_max_open_caps_default_idle() {
        let opts = PoolOptions::default().with_max_open(2).with_max_idle(0).normalized();
        assert_eq!(opts.max_idle, 2);
    }
}
