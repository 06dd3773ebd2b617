//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Returns every problem found,
//! not just the first.

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let origin = &config.server.origin;
    if !(origin.starts_with("http://") || origin.starts_with("https://")) {
        errors.push(ValidationError::new(
            "server.origin",
            "must be an absolute http(s) URL",
        ));
    }
    if !origin.ends_with('/') {
        errors.push(ValidationError::new(
            "server.origin",
            "must end with '/'",
        ));
    }
    if !matches!(config.server.scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::new(
            "server.scheme",
            "must be \"http\" or \"https\"",
        ));
    }
    if !config.server.login_path.starts_with('/') {
        errors.push(ValidationError::new("server.login_path", "must start with '/'"));
    }
    if !config.server.favicon_path.starts_with('/') {
        errors.push(ValidationError::new("server.favicon_path", "must start with '/'"));
    }
    if config.server.session_cookie_name.is_empty()
        || config
            .server
            .session_cookie_name
            .contains(|c: char| c == '=' || c == ';' || c.is_whitespace())
    {
        errors.push(ValidationError::new(
            "server.session_cookie_name",
            "must be a non-empty cookie token",
        ));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }
    if config.sessions.token_length < 16 {
        errors.push(ValidationError::new("sessions.token_length", "must be >= 16"));
    }
    if config.sessions.recycle_interval_secs == 0 {
        errors.push(ValidationError::new("sessions.recycle_interval_secs", "must be > 0"));
    }
    if config.upstream.pool_capacity == 0 {
        errors.push(ValidationError::new("upstream.pool_capacity", "must be > 0"));
    }
    if config.upstream.max_attempts == 0 {
        errors.push(ValidationError::new("upstream.max_attempts", "must be >= 1"));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be > 0"));
    }
    if config.cache.max_size_bytes == 0 {
        errors.push(ValidationError::new("cache.max_size_bytes", "must be > 0"));
    }
    if config.cache.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_secs", "must be > 0"));
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
