//! Tracker completion.
//!
//! Most exchanges are complete once the chain resolves. A relayed response
//! is only complete when its body has been streamed to the client, so the
//! stage defers completion and the body wrapper carries a [`Completion`]
//! until the stream ends or is dropped.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::observability::{metrics, HistoryLogger, RequestTracker, TrackerStatus};

/// Status recorded when the client goes away before the body finished.
pub fn client_closed() -> StatusCode {
    StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// A tracker waiting to be finished, plus where it is reported.
pub struct Completion {
    tracker: RequestTracker,
    history: Arc<dyn HistoryLogger>,
}

impl Completion {
    pub fn new(tracker: RequestTracker, history: Arc<dyn HistoryLogger>) -> Self {
        Self { tracker, history }
    }

    pub fn tracker(&self) -> &RequestTracker {
        &self.tracker
    }

    /// Finish with `status` unless a stage already set one, then report.
    pub fn finish(mut self, status: StatusCode) {
        if self.tracker.finish(status) {
            self.report();
        }
    }

    /// Finish as a failure, replacing whatever status was pending.
    pub fn fail(mut self, status: StatusCode) {
        if !self.tracker.is_finished() {
            self.tracker.status = Some(TrackerStatus::Http(status));
            self.tracker.finish(status);
            self.report();
        }
    }

    fn report(&self) {
        metrics::record_request(&self.tracker);
        self.history.log(&self.tracker);
    }
}
