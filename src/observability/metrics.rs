//! Metrics collection and exposition.
//!
//! # Metrics
//! - `devgate_requests_total` (counter): finished requests by target, status
//! - `devgate_request_duration_seconds` (histogram): time until the response
//!   completed (last relayed byte for proxied bodies)
//! - `devgate_ws_events_total` (counter): WebSocket lifecycle events
//! - `devgate_relay_failures_total` (counter): relay failures by kind
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! embedders without an exporter pay nothing.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::observability::tracker::{RequestTracker, WsEvent};

/// Install the Prometheus exporter on `addr`. Must run inside the runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished HTTP exchange.
pub fn record_request(tracker: &RequestTracker) {
    let status = tracker.status.map(|s| s.to_string()).unwrap_or_default();
    metrics::counter!(
        "devgate_requests_total",
        "target" => tracker.target.as_str(),
        "status" => status
    )
    .increment(1);

    if let Some(span) = tracker.span() {
        metrics::histogram!(
            "devgate_request_duration_seconds",
            "target" => tracker.target.as_str()
        )
        .record(span.as_secs_f64());
    }
}

pub fn record_ws_event(event: WsEvent) {
    metrics::counter!("devgate_ws_events_total", "event" => event.as_str()).increment(1);
}

pub fn record_relay_failure(kind: &'static str) {
    metrics::counter!("devgate_relay_failures_total", "kind" => kind).increment(1);
}
