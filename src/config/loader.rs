//! Configuration loading from disk and command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Values supplied on the command line or through the environment.
/// Anything set here wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub proxy_target: Option<String>,
    pub port: Option<u16>,
    pub ignores: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// Merge into `config` and re-run validation.
    pub fn apply(self, mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
        if let Some(root) = self.root {
            config.interceptor.root = root;
        }
        if let Some(target) = self.proxy_target {
            config.proxy.target = target;
        }
        if let Some(port) = self.port {
            config.listener.bind_address = with_port(&config.listener.bind_address, port);
        }
        if let Some(ignores) = self.ignores {
            config.interceptor.ignores = ignores;
        }
        if let Some(extensions) = self.extensions {
            config.interceptor.extensions = extensions;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

fn with_port(bind_address: &str, port: u16) -> String {
    let host = bind_address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(bind_address);
    format!("{}:{}", host, port)
}
