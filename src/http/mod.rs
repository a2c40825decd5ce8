//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing, CORS)
//!     → Pipeline::dispatch
//!     → response.rs (shared JSON payload shapes)
//!     → Send to client
//! ```

pub mod cors;
pub mod response;
pub mod server;

pub use server::{AppState, HttpServer};
