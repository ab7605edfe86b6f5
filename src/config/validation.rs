//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Validate addresses and the mount prefix
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be a socket address, got {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("sockjs.prefix must start with '/', not be '/' and have no trailing '/', got {0:?}")]
    InvalidPrefix(String),

    #[error("observability.log_level must be one of trace, debug, info, warn, error, got {0:?}")]
    UnknownLogLevel(String),
}

/// Check every semantic rule and collect all failures.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

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

    let prefix = &config.sockjs.prefix;
    if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }

    let limits = [
        ("sockjs.session_timeout_ms", config.sockjs.session_timeout_ms as usize),
        ("sockjs.heartbeat_period_ms", config.sockjs.heartbeat_period_ms as usize),
        ("sockjs.max_bytes_streaming", config.sockjs.max_bytes_streaming),
        ("timeouts.send_secs", config.timeouts.send_secs as usize),
        ("security.max_body_size", config.security.max_body_size),
    ];
    for (field, value) in limits {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
