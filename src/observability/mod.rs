//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline / relay stages:
//!     → tracker.rs (per-request routing record)
//!     → history.rs (one line per finished exchange or WebSocket event)
//!     → metrics.rs (counters, histograms)
//!     → reporter.rs (override failures)
//!
//! logging.rs installs the tracing subscriber everything above writes to.
//! ```

pub mod history;
pub mod logging;
pub mod metrics;
pub mod reporter;
pub mod tracker;

pub use history::{ConsoleHistory, HistoryLogger};
pub use reporter::{ErrorReporter, TracingErrorReporter};
pub use tracker::{RequestKind, RequestTracker, Target, TrackerStatus, WsEvent};
