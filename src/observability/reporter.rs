//! Process-level error reporting for failed overrides.

use crate::error::HandlerError;

/// Receives every override failure after its error payload was written.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &HandlerError, path: &str);
}

/// Reports failures as `tracing` errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&self, error: &HandlerError, path: &str) {
        tracing::error!(
            path = %path,
            error = %error.diagnostic(),
            "Override handler failed"
        );
    }
}
