//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration for the development gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Local override probing.
    pub interceptor: InterceptorConfig,

    /// Static file serving.
    pub static_files: StaticConfig,

    /// Upstream relay.
    pub proxy: ProxyConfig,

    /// CORS response headers.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
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

/// Override probing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptorConfig {
    /// Directory override files are looked up in. Relative paths resolve
    /// against the working directory.
    pub root: PathBuf,

    /// Extensions to probe, highest priority first. Accepts a list or a
    /// comma-separated string (`".js, .json"`).
    #[serde(deserialize_with = "deserialize_extensions")]
    pub extensions: Vec<String>,

    /// Path prefixes, relative to `root`, that are never probed.
    pub ignores: Vec<String>,

    /// Extensions dispatched to registered handler sets.
    #[serde(deserialize_with = "deserialize_extensions")]
    pub module_extensions: Vec<String>,

    /// Extensions served as JSON payloads.
    #[serde(deserialize_with = "deserialize_extensions")]
    pub data_extensions: Vec<String>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: vec!["js".to_string(), "json".to_string(), "html".to_string()],
            ignores: Vec::new(),
            module_extensions: vec!["js".to_string()],
            data_extensions: vec!["json".to_string()],
        }
    }
}

/// Static file serving configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    /// Serve static files at all.
    pub enabled: bool,

    /// Directory to serve from. Defaults to the interceptor root.
    pub root: Option<PathBuf>,

    /// Index document for directory paths. Empty disables it.
    pub index: String,

    /// Only serve after the rest of the chain answered 404 with no body.
    pub defer: bool,

    /// Serve dotfiles.
    pub hidden: bool,
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: None,
            index: "index.html".to_string(),
            defer: false,
            hidden: false,
        }
    }
}

impl StaticConfig {
    pub fn index_document(&self) -> Option<String> {
        Some(self.index.trim())
            .filter(|index| !index.is_empty())
            .map(str::to_string)
    }
}

/// Upstream relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream origin (e.g., "http://localhost:3000").
    pub target: String,

    /// Relay WebSocket upgrades.
    pub websocket: bool,

    /// Send the upstream authority as `Host` instead of the client's.
    pub change_origin: bool,

    /// TCP connect timeout in seconds. A timeout answers 504.
    pub connect_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            target: "http://localhost:3000".to_string(),
            websocket: true,
            change_origin: true,
            connect_timeout_secs: 10,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Add CORS headers to responses.
    pub enabled: bool,

    /// Methods advertised on preflight responses.
    pub allow_methods: Vec<String>,

    /// Send `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,

    /// Headers exposed to scripts.
    pub expose_headers: Vec<String>,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_methods: ["GET", "HEAD", "PUT", "POST", "DELETE", "PATCH"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allow_credentials: false,
            expose_headers: Vec::new(),
            max_age_secs: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus exporter bind address. Disabled when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

/// Parse `".js, json,.html"` into `["js", "json", "html"]`.
pub fn parse_extension_list(raw: &str) -> Vec<String> {
    normalize_extensions(raw.split(','))
}

fn normalize_extensions<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().trim_start_matches('.'))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_extensions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::List(items) => normalize_extensions(items.iter().map(String::as_str)),
        Raw::Joined(joined) => parse_extension_list(&joined),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.interceptor.extensions, vec!["js", "json", "html"]);
        assert_eq!(config.static_files.index_document().as_deref(), Some("index.html"));
        assert!(config.proxy.websocket);
        assert!(config.proxy.change_origin);
    }

    #[test]
    fn extension_list_accepts_joined_string() {
        assert_eq!(parse_extension_list(".js, .json,html"), vec!["js", "json", "html"]);
        assert_eq!(parse_extension_list(" , "), Vec::<String>::new());
    }

    #[test]
    fn extensions_deserialize_from_both_forms() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [interceptor]
            root = "./mock"
            extensions = ".json, .js"
            data_extensions = [".json5", "json"]
            "#,
        )
        .unwrap();
        assert_eq!(config.interceptor.extensions, vec!["json", "js"]);
        assert_eq!(config.interceptor.data_extensions, vec!["json5", "json"]);
        assert_eq!(config.interceptor.module_extensions, vec!["js"]);
        assert_eq!(config.interceptor.root, PathBuf::from("./mock"));
    }

    #[test]
    fn empty_index_disables_index_document() {
        let config: GatewayConfig = toml::from_str("[static_files]\nindex = \"\"").unwrap();
        assert_eq!(config.static_files.index_document(), None);
    }
}
