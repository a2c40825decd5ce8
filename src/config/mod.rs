//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML), optional
//!     → loader.rs (parse & deserialize)
//!     → ConfigOverrides (CLI flags / environment)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → GatewayBuilder assembles the pipeline from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError, ConfigOverrides};
pub use schema::{
    parse_extension_list, CorsConfig, GatewayConfig, InterceptorConfig, ListenerConfig,
    ObservabilityConfig, ProxyConfig, StaticConfig,
};
pub use validation::{validate_config, ValidationError};
