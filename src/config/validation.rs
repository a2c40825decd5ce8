//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the proxy target is a usable HTTP origin
//! - Validate addresses, extensions and CORS methods
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("proxy.target '{target}' is invalid: {reason}")]
    InvalidProxyTarget { target: String, reason: String },

    #[error("proxy.target '{0}' must use http://")]
    UnsupportedProxyScheme(String),

    #[error("interceptor.extensions must not be empty")]
    NoExtensions,

    #[error("static_files.index '{0}' must be a file name")]
    InvalidIndex(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("cors.allow_methods contains invalid method '{0}'")]
    InvalidCorsMethod(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Err(e) = validate_target(&config.proxy.target) {
        errors.push(e);
    }

    if config.interceptor.extensions.is_empty() {
        errors.push(ValidationError::NoExtensions);
    }

    if let Some(index) = config.static_files.index_document() {
        if index.contains('/') || index.contains('\\') || index == ".." {
            errors.push(ValidationError::InvalidIndex(index));
        }
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidMetricsAddress(addr.clone()));
        }
    }

    for method in &config.cors.allow_methods {
        if Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidCorsMethod(method.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse and check the upstream origin.
pub fn validate_target(target: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(target).map_err(|e| ValidationError::InvalidProxyTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ValidationError::UnsupportedProxyScheme(target.to_string()));
    }
    if url.host_str().is_none() {
        return Err(ValidationError::InvalidProxyTarget {
            target: target.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}
