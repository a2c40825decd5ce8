//! Error taxonomy for the gateway.
//!
//! # Recovery Rules
//! - `SendError::NotFound` is recovered by the static stage (fallthrough)
//! - `HandlerError` becomes a structured 500 payload plus an error report
//! - `RelayError` maps to a fixed status code and terminates the request
//! - `GatewayError` is what escapes the pipeline; rendered as 500

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::response::error_body;

/// Failure while loading or running a local override.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A module file exists on disk but nothing registered handlers for it.
    #[error("no handlers registered for module '{0}'")]
    NotRegistered(String),

    /// The override file could not be read.
    #[error("failed to read {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The data override is not valid JSON.
    #[error("invalid JSON in {path}: {source}")]
    Data {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The handler itself failed.
    #[error("{0}")]
    Execution(String),
}

impl HandlerError {
    /// Build an execution failure from any message.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Full error chain, used as the diagnostic detail of error payloads.
    pub fn diagnostic(&self) -> String {
        error_chain(self)
    }
}

/// Failure reported by a file sender.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("file not found")]
    NotFound,

    #[error("failed to send {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SendError {
    /// Classify an I/O error hit while resolving `path`.
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => Self::NotFound,
            _ => Self::Io { path, source },
        }
    }
}

/// Transport failure while relaying to the upstream.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream refused the connection: {0}")]
    Refused(String),

    #[error("upstream connection timed out: {0}")]
    Timeout(String),

    #[error("upstream request failed: {0}")]
    Other(String),

    #[error("cannot build upstream request: {0}")]
    InvalidRequest(String),
}

impl RelayError {
    /// Walk the source chain looking for the underlying socket error.
    pub fn classify(err: &(dyn StdError + 'static)) -> Self {
        let detail = error_chain(err);
        let mut current = Some(err);
        while let Some(e) = current {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    ErrorKind::ConnectionRefused => return Self::Refused(detail),
                    ErrorKind::TimedOut => return Self::Timeout(detail),
                    _ => {}
                }
            }
            current = e.source();
        }
        Self::Other(detail)
    }

    /// Status code the client sees for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Refused(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Other(_) | Self::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Refused(_) => "refused",
            Self::Timeout(_) => "timeout",
            Self::Other(_) => "other",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// Fatal error escaping the pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("static file error: {0}")]
    Static(#[from] SendError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = error_body(&self.to_string(), Some(error_chain(&self)));
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(e) = current {
        let message = e.to_string();
        if !rendered.ends_with(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        current = e.source();
    }
    rendered
}
