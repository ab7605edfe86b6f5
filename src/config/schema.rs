//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the SockJS XHR server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Session and transport tuning.
    pub sockjs: SockJsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How a backlog of queued messages is split into frames when flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchingPolicy {
    /// Everything queued goes out as a single `a[...]` frame.
    #[default]
    Coalesce,
    /// One `a[...]` frame per queued message.
    PerMessage,
}

/// Whether the streaming preamble counts toward `max_bytes_streaming`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreambleAccounting {
    /// Only encoded frames (including their newline) are counted.
    #[default]
    Excluded,
    /// The 2049-byte preamble is counted as well.
    Included,
}

/// Session and transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SockJsConfig {
    /// Path prefix the transports are mounted under (e.g., "/echo").
    pub prefix: String,

    /// Idle time without an attached listener before a session expires, in milliseconds.
    pub session_timeout_ms: u64,

    /// Maximum quiet time on an attached listener before a heartbeat, in milliseconds.
    pub heartbeat_period_ms: u64,

    /// Bytes a streaming exchange may carry before it is recycled.
    pub max_bytes_streaming: usize,

    /// Backlog flush policy.
    pub batching: BatchingPolicy,

    /// Streaming byte accounting policy.
    pub preamble_accounting: PreambleAccounting,
}

impl Default for SockJsConfig {
    fn default() -> Self {
        Self {
            prefix: "/echo".to_string(),
            session_timeout_ms: 5_000,
            heartbeat_period_ms: 25_000,
            max_bytes_streaming: 128 * 1024,
            batching: BatchingPolicy::Coalesce,
            preamble_accounting: PreambleAccounting::Excluded,
        }
    }
}

impl SockJsConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}

/// Timeout configuration for short-lived requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Timeout for `xhr_send` requests in seconds.
    pub send_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { send_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum `xhr_send` body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
