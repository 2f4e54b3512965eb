//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and rule
//! consistency. Every problem is collected so an operator sees them all at
//! once.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ShieldConfig;
use crate::security::ip_reputation::MAX_DURATION_HOURS;
use crate::security::rate_limit::{RuleSet, RuleSetError};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rate_limit.rules: {0}")]
    RateLimitRules(#[from] RuleSetError),

    #[error("{field}: `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },
}

/// Validate a parsed configuration, returning every error found.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = RuleSet::from_config(&config.rate_limit.rules) {
        errors.push(ValidationError::RateLimitRules(e));
    }

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_address(&mut errors, "upstream.address", &config.upstream.address);
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let positive = [
        ("timeouts.request_secs", config.timeouts.request_secs as usize),
        ("audit.queue_capacity", config.audit.queue_capacity),
        ("audit.max_page_size", config.audit.max_page_size),
        ("audit.memory_capacity", config.audit.memory_capacity),
        ("inspection.max_body_bytes", config.inspection.max_body_bytes),
        ("ip_reputation.sweep_interval_secs", config.ip_reputation.sweep_interval_secs as usize),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::MustBePositive(field));
        }
    }

    if config.auto_block.enabled {
        let auto_block = [
            ("auto_block.violation_threshold", config.auto_block.violation_threshold as u64),
            ("auto_block.window_secs", config.auto_block.window_secs),
            ("auto_block.block_duration_hours", config.auto_block.block_duration_hours as u64),
        ];
        for (field, value) in auto_block {
            if value == 0 {
                errors.push(ValidationError::MustBePositive(field));
            }
        }
        if config.auto_block.block_duration_hours > MAX_DURATION_HOURS {
            errors.push(ValidationError::TooLarge {
                field: "auto_block.block_duration_hours",
                max: u64::from(MAX_DURATION_HOURS),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
