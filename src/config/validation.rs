//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Every target parses as an http URL and appears once
//! - Validate value ranges (intervals and timeouts > 0, addresses parse)
//!
//! Returns all validation errors, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::{Target, TargetError};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no targets configured")]
    NoTargets,
    #[error(transparent)]
    InvalidTarget(#[from] TargetError),
    #[error("duplicate target '{0}'")]
    DuplicateTarget(String),
    #[error("invalid {field} '{value}'")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("health_check.path must start with '/', got '{0}'")]
    InvalidProbePath(String),
}

/// Check a parsed configuration. Pure: never touches the network or disk.
pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.targets.is_empty() {
        errors.push(ValidationError::NoTargets);
    }

    let mut seen = HashSet::new();
    for address in &config.targets {
        match Target::parse(address) {
            Ok(target) => {
                if !seen.insert(target.address().to_string()) {
                    errors.push(ValidationError::DuplicateTarget(target.address().to_string()));
                }
            }
            Err(e) => errors.push(e.into()),
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.health_check.interval_ms == 0 {
        errors.push(ValidationError::Zero("health_check.interval_ms"));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::Zero("health_check.timeout_ms"));
    }
    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError::InvalidProbePath(config.health_check.path.clone()));
    }

    if config.forwarding.timeout_ms == 0 {
        errors.push(ValidationError::Zero("forwarding.timeout_ms"));
    }
    if config.forwarding.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("forwarding.max_body_bytes"));
    }
    if config.forwarding.max_attempts == Some(0) {
        errors.push(ValidationError::Zero("forwarding.max_attempts"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
