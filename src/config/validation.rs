//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check server identity (names present and unique)
//! - Check balance type codes and endpoint lists
//! - Check pool limits against each other
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BalancerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::{BalancerConfig, PoolConfig};
use crate::load_balancer::check_balance_type;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server #{index} has an empty name")]
    EmptyServerName { index: usize },

    #[error("server {name:?} is defined more than once")]
    DuplicateServer { name: String },

    #[error("server {server:?} has unknown balance type {code:?}")]
    UnknownBalanceType { server: String, code: String },

    #[error("server {server:?} has no endpoints")]
    NoEndpoints { server: String },

    #[error("server {server:?} endpoint #{index} has an empty address")]
    EmptyAddress { server: String, index: usize },

    #[error("pool max_idle_conns ({max_idle}) exceeds max_open_conns ({max_open})")]
    IdleExceedsOpen { max_idle: usize, max_open: usize },

    #[error("pool min_idle_conns ({min_idle}) exceeds max_idle_conns ({max_idle})")]
    MinIdleExceedsIdle { min_idle: usize, max_idle: usize },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_pool(&config.pool, &mut errors);

    let mut seen = HashSet::new();
    for (index, server) in config.servers.iter().enumerate() {
        if server.name.trim().is_empty() {
            errors.push(ValidationError::EmptyServerName { index });
        } else if !seen.insert(server.name.as_str()) {
            errors.push(ValidationError::DuplicateServer {
                name: server.name.clone(),
            });
        }

        // blank means the default strategy
        if !server.lb.trim().is_empty() && !check_balance_type(&server.lb) {
            errors.push(ValidationError::UnknownBalanceType {
                server: server.name.clone(),
                code: server.lb.clone(),
            });
        }

        if server.endpoints.is_empty() {
            errors.push(ValidationError::NoEndpoints {
                server: server.name.clone(),
            });
        }
        for (index, endpoint) in server.endpoints.iter().enumerate() {
            if endpoint.addr.trim().is_empty() {
                errors.push(ValidationError::EmptyAddress {
                    server: server.name.clone(),
                    index,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_pool(pool: &PoolConfig, errors: &mut Vec<ValidationError>) {
    let max_open = pool.max_open();
    if max_open > 0 && pool.max_idle_conns > max_open {
        errors.push(ValidationError::IdleExceedsOpen {
            max_idle: pool.max_idle_conns,
            max_open,
        });
    }
    if pool.max_idle_conns > 0 && pool.min_idle_conns > pool.max_idle_conns {
        errors.push(ValidationError::MinIdleExceedsIdle {
            min_idle: pool.min_idle_conns,
            max_idle: pool.max_idle_conns,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServerConfig;
    use crate::load_balancer::EndpointServer;

    fn server(name: &str, lb: &str, addrs: &[&str]) -> ServerConfig {
        ServerConfig {
            name: name.to_string(),
            priority: 0,
            timeout: 0,
            lb: lb.to_string(),
            endpoints: addrs.iter().map(|a| EndpointServer::new(*a, 1)).collect(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = BalancerConfig {
            servers: vec![server("a", "WRR", &["10.0.0.1:1"]), server("b", "", &["10.0.0.2:1"])],
            ..BalancerConfig::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let config = BalancerConfig {
            pool: PoolConfig {
                max_open_conns: 4,
                max_idle_conns: 8,
                ..PoolConfig::default()
            },
            servers: vec![
                server("", "RR", &["10.0.0.1:1"]),
                server("a", "FAST", &[]),
                server("a", "CH", &[" "]),
            ],
            ..BalancerConfig::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::IdleExceedsOpen { max_idle: 8, max_open: 4 },
                ValidationError::EmptyServerName { index: 0 },
                ValidationError::UnknownBalanceType {
                    server: "a".to_string(),
                    code: "FAST".to_string()
                },
                ValidationError::NoEndpoints { server: "a".to_string() },
                ValidationError::DuplicateServer { name: "a".to_string() },
                ValidationError::EmptyAddress {
                    server: "a".to_string(),
                    index: 0
                },
            ]
        );
    }

    #[test]
    fn test_min_idle_bound() {
        let config = BalancerConfig {
            pool: PoolConfig {
                max_idle_conns: 2,
                min_idle_conns: 3,
                ..PoolConfig::default()
            },
            ..BalancerConfig::default()
        };
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::MinIdleExceedsIdle { min_idle: 3, max_idle: 2 }]
        );
    }
}
