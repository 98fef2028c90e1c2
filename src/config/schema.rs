//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the web
//! service and the pooled client. All types derive Serde traits for
//! deserialization from config files.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Web service binding and shutdown settings.
    pub service: ServiceConfig,

    /// Pooled HTTP client settings.
    pub client: ClientConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Web service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Hostnames or IPs to bind, each combined with `port`.
    pub hosts: Vec<String>,

    /// TCP port. When `hosts` is empty the service binds `0.0.0.0:port`.
    pub port: Option<u16>,

    /// Unix domain socket paths to bind (unix only).
    pub unix_paths: Vec<String>,

    /// Time each site gets to drain on stop, in seconds.
    pub shutdown_timeout_secs: f64,

    /// Listen backlog depth.
    pub backlog: u32,

    /// Set SO_REUSEADDR on TCP sockets.
    pub reuse_address: Option<bool>,

    /// Set SO_REUSEPORT on TCP sockets (unix only).
    pub reuse_port: Option<bool>,

    /// Maximum request body buffered by `WebRequest`, in bytes.
    pub max_body_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1".to_string()],
            port: Some(8080),
            unix_paths: Vec::new(),
            shutdown_timeout_secs: 60.0,
            backlog: 128,
            reuse_address: None,
            reuse_port: None,
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.shutdown_timeout_secs).unwrap_or_default()
    }
}

/// Pooled HTTP client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: f64,

    /// How long a pool may sit unused before it is torn down, in seconds.
    pub idle_session_timeout_secs: f64,

    /// Disable keep-alive: reconnect for every request.
    pub force_close: bool,

    /// Maximum simultaneous connections in the pool.
    pub connection_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10.0,
            idle_session_timeout_secs: 600.0,
            force_close: false,
            connection_limit: 100,
        }
    }
}

/// Largest accepted client timeout, in seconds (one year).
pub const MAX_TIMEOUT_SECS: f64 = 365.0 * 24.0 * 3600.0;

impl ClientConfig {
    /// Per-request timeout. Values above `MAX_TIMEOUT_SECS` are capped and
    /// invalid ones map to zero; validation rejects both.
    pub fn request_timeout(&self) -> Duration {
        bounded_secs(self.request_timeout_secs)
    }

    pub fn idle_session_timeout(&self) -> Duration {
        bounded_secs(self.idle_session_timeout_secs)
    }
}

fn bounded_secs(secs: f64) -> Duration {
    let secs = if secs > MAX_TIMEOUT_SECS { MAX_TIMEOUT_SECS } else { secs };
    Duration::try_from_secs_f64(secs).unwrap_or_default()
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Emit logs as JSON lines instead of the pretty format.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
