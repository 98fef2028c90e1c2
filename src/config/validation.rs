//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0 and at most a year, limits > 0 and
//!   within what a semaphore can hold)
//! - Ensure the service has something to bind
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use tokio::sync::Semaphore;

use crate::config::schema::{AppConfig, ClientConfig, ServiceConfig, MAX_TIMEOUT_SECS};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `client.connection_limit`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a whole configuration, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    errors.extend(validate_client(&config.client));
    errors.extend(validate_service(&config.service));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the client section on its own.
pub fn validate_client(config: &ClientConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (field, secs) in [
        ("client.request_timeout_secs", config.request_timeout_secs),
        ("client.idle_session_timeout_secs", config.idle_session_timeout_secs),
    ] {
        if !is_positive(secs) {
            errors.push(ValidationError::new(field, "must be a positive number of seconds"));
        } else if secs > MAX_TIMEOUT_SECS {
            errors.push(ValidationError::new(
                field,
                format!("must not exceed {MAX_TIMEOUT_SECS} seconds"),
            ));
        }
    }
    if config.connection_limit == 0 {
        errors.push(ValidationError::new(
            "client.connection_limit",
            "must be greater than zero",
        ));
    } else if config.connection_limit > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::new(
            "client.connection_limit",
            format!("must not exceed {}", Semaphore::MAX_PERMITS),
        ));
    }

    errors
}

/// Validate the service section on its own.
pub fn validate_service(config: &ServiceConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.port.is_none() && config.unix_paths.is_empty() {
        errors.push(ValidationError::new(
            "service.port",
            "a port or at least one unix path is required",
        ));
    }
    if !config.hosts.is_empty() && config.port.is_none() {
        errors.push(ValidationError::new(
            "service.hosts",
            "hosts given without a port",
        ));
    }
    if config.backlog == 0 {
        errors.push(ValidationError::new("service.backlog", "must be greater than zero"));
    }
    if !is_positive(config.shutdown_timeout_secs) {
        errors.push(ValidationError::new(
            "service.shutdown_timeout_secs",
            "must be a positive number of seconds",
        ));
    }
    if config.max_body_size == 0 {
        errors.push(ValidationError::new(
            "service.max_body_size",
            "must be greater than zero",
        ));
    }

    errors
}

fn is_positive(secs: f64) -> bool {
    secs.is_finite() && secs > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = AppConfig::default();
        config.client.request_timeout_secs = 0.0;
        config.client.idle_session_timeout_secs = f64::NAN;
        config.service.backlog = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "client.request_timeout_secs",
                "client.idle_session_timeout_secs",
                "service.backlog",
            ]
        );
    }

    #[test]
    fn rejects_out_of_range_client_values() {
        for secs in [1e19, 1e20, f64::MAX] {
            let config = ClientConfig {
                idle_session_timeout_secs: secs,
                request_timeout_secs: secs,
                ..ClientConfig::default()
            };
            let errors = validate_client(&config);
            assert_eq!(errors.len(), 2, "{secs} must be rejected");
            assert!(errors[1].message.contains("must not exceed"));
        }

        let config = ClientConfig {
            connection_limit: usize::MAX,
            ..ClientConfig::default()
        };
        let errors = validate_client(&config);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "client.connection_limit");

        let at_limit = ClientConfig {
            connection_limit: Semaphore::MAX_PERMITS,
            idle_session_timeout_secs: MAX_TIMEOUT_SECS,
            ..ClientConfig::default()
        };
        assert!(validate_client(&at_limit).is_empty());
    }

    #[test]
    fn service_needs_a_bind_target() {
        let service = ServiceConfig {
            hosts: Vec::new(),
            port: None,
            ..ServiceConfig::default()
        };
        let errors = validate_service(&service);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "service.port");

        let unix_only = ServiceConfig {
            hosts: Vec::new(),
            port: None,
            unix_paths: vec!["/tmp/app.sock".into()],
            ..ServiceConfig::default()
        };
        assert!(validate_service(&unix_only).is_empty());
    }
}
