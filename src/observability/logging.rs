//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level so a single run can be made
//! noisier without touching the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(log_level: &str) -> String {
    format!("devgate={level},tower_http={level}", level = log_level)
}

/// Initialize the global subscriber. Safe to call more than once.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
