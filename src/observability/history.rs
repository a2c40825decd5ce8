//! Request history output.
//!
//! The pipeline hands every finished tracker (and every WebSocket event
//! snapshot) to a [`HistoryLogger`]. The default renders one line per
//! exchange:
//!
//! ```text
//!  PROXY    GET 200 /api/users -> http://localhost:3000/api/users (12ms)
//!  LOCAL  POST 200 /api/login -> /mock/api/login.js[all] (1ms)
//!  PROXY    WS SND -> ws://localhost:3000/socket
//! ```

use std::sync::Arc;

use crate::observability::tracker::{RequestTracker, TrackerStatus};

/// Consumer of completed trackers.
pub trait HistoryLogger: Send + Sync {
    fn log(&self, tracker: &RequestTracker);
}

type Template = Arc<dyn Fn(&RequestTracker) -> String + Send + Sync>;

/// Writes history lines through `tracing` under the `devgate::history` target.
#[derive(Clone, Default)]
pub struct ConsoleHistory {
    template: Option<Template>,
}

impl ConsoleHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default line layout.
    pub fn with_template<F>(template: F) -> Self
    where
        F: Fn(&RequestTracker) -> String + Send + Sync + 'static,
    {
        Self {
            template: Some(Arc::new(template)),
        }
    }

    pub fn render(&self, tracker: &RequestTracker) -> String {
        match &self.template {
            Some(template) => template(tracker),
            None => render_line(tracker),
        }
    }
}

impl HistoryLogger for ConsoleHistory {
    fn log(&self, tracker: &RequestTracker) {
        let line = self.render(tracker);
        let status = tracker.status.map(|s| s.to_string()).unwrap_or_default();
        match tracker.status {
            Some(TrackerStatus::Http(code)) if code.is_server_error() => {
                tracing::warn!(target: "devgate::history", routed = tracker.target.as_str(), %status, "{}", line)
            }
            _ => tracing::info!(target: "devgate::history", routed = tracker.target.as_str(), %status, "{}", line),
        }
    }
}

/// Default history layout.
pub fn render_line(tracker: &RequestTracker) -> String {
    let mut line = format!(
        " {:<6} {:>4}",
        tracker.target.as_str().to_uppercase(),
        tracker.kind.to_string().to_uppercase()
    );

    if let Some(status) = tracker.status {
        line.push_str(&format!(" {:>3}", status));
    }

    line.push(' ');
    line.push_str(&tracker.log);

    // Zero-length spans are left out, as for WebSocket events.
    if let Some(span) = tracker.span().filter(|s| s.as_millis() > 0) {
        line.push_str(&format!(" ({}ms)", span.as_millis()));
    }
    line
}
