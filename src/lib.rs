//! Local development gateway.
//!
//! Sits in front of a real backend and answers each request from the first
//! stage that claims it:
//!
//! ```text
//! request → [before stages] → Interceptor → StaticFallback → ProxyRelay
//!              (host hooks)     (overrides)   (static files)   (upstream, WS)
//! ```
//!
//! Every request produces one history line naming what served it.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod interceptor;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod statics;

#[cfg(test)]
mod testing;

pub use config::GatewayConfig;
pub use error::{GatewayError, HandlerError, RelayError, SendError};
pub use gateway::GatewayBuilder;
pub use http::HttpServer;
pub use interceptor::{handler_fn, HandlerSet, OverrideHandler};
pub use lifecycle::Shutdown;
pub use pipeline::{Exchange, Next, Pipeline, Stage};
