//! Per-request routing record.
//!
//! # Lifecycle
//! ```text
//! Pipeline entry   → RequestTracker::begin (start)
//! Stage handles it → mark(target, log)
//! Chain resolved   → finish(status) (end + span, once)
//!                  → HistoryLogger::log
//! ```
//!
//! WebSocket lifecycle events never touch the HTTP tracker; each event
//! builds its own finished snapshot with [`RequestTracker::websocket`].

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use axum::http::{Method, StatusCode};

/// Who ultimately served the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Local,
    Static,
    Proxy,
}

impl Target {
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Local => "local",
            Target::Static => "static",
            Target::Proxy => "proxy",
        }
    }
}

/// HTTP method, or the `WS` marker for relayed WebSocket traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Http(Method),
    WebSocket,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Http(method) => f.write_str(method.as_str()),
            RequestKind::WebSocket => f.write_str("WS"),
        }
    }
}

/// WebSocket lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WsEvent {
    Open,
    Send,
    Receive,
    Close,
}

impl WsEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WsEvent::Open => "open",
            WsEvent::Send => "send",
            WsEvent::Receive => "receive",
            WsEvent::Close => "close",
        }
    }

    /// Three-letter code shown in the status column.
    pub fn code(&self) -> &'static str {
        match self {
            WsEvent::Open => "OPN",
            WsEvent::Send => "SND",
            WsEvent::Receive => "REC",
            WsEvent::Close => "CLS",
        }
    }

    /// Direction marker prefixed to the upstream URL in history lines.
    pub fn arrow(&self) -> &'static str {
        match self {
            WsEvent::Open => "<=>",
            WsEvent::Send => "->",
            WsEvent::Receive => "<-",
            WsEvent::Close => "-x-",
        }
    }
}

/// Final status of a tracked exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    Http(StatusCode),
    Ws(WsEvent),
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerStatus::Http(code) => write!(f, "{}", code.as_u16()),
            TrackerStatus::Ws(event) => f.write_str(event.code()),
        }
    }
}

/// Mutable routing record carried alongside a request.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    /// Who served the request. Defaults to `Local`.
    pub target: Target,
    /// Method or `WS`.
    pub kind: RequestKind,
    /// Set by `finish` unless a stage already chose one.
    pub status: Option<TrackerStatus>,
    /// Human-readable routing decision.
    pub log: String,
    start: SystemTime,
    started_at: Instant,
    end: Option<SystemTime>,
    span: Option<Duration>,
}

impl RequestTracker {
    /// Start tracking an HTTP request. Called once, at pipeline entry.
    pub fn begin(method: Method) -> Self {
        Self {
            target: Target::Local,
            kind: RequestKind::Http(method),
            status: None,
            log: String::new(),
            start: SystemTime::now(),
            started_at: Instant::now(),
            end: None,
            span: None,
        }
    }

    /// Transient snapshot for one WebSocket lifecycle event.
    pub fn websocket(event: WsEvent, upstream: &str) -> Self {
        let mut tracker = Self {
            target: Target::Proxy,
            kind: RequestKind::WebSocket,
            status: Some(TrackerStatus::Ws(event)),
            log: format!("{} {}", event.arrow(), upstream),
            start: SystemTime::now(),
            started_at: Instant::now(),
            end: None,
            span: None,
        };
        tracker.complete();
        tracker
    }

    /// Record the routing decision of the stage handling the request.
    pub fn mark(&mut self, target: Target, log: impl Into<String>) {
        self.target = target;
        self.log = log.into();
    }

    /// Close the record. Returns `false` if it was already finished.
    pub fn finish(&mut self, status: StatusCode) -> bool {
        if self.end.is_some() {
            return false;
        }
        if self.status.is_none() {
            self.status = Some(TrackerStatus::Http(status));
        }
        self.complete();
        true
    }

    fn complete(&mut self) {
        self.end = Some(SystemTime::now());
        self.span = Some(self.started_at.elapsed());
    }

    pub fn start(&self) -> SystemTime {
        self.start
    }

    pub fn end(&self) -> Option<SystemTime> {
        self.end
    }

    pub fn span(&self) -> Option<Duration> {
        self.span
    }

    pub fn is_finished(&self) -> bool {
        self.end.is_some()
    }
}

/// Render a resolved file for history lines, relative to the working
/// directory when possible.
pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(|p| format!("/{}", p.display())))
        .unwrap_or_else(|| path.display().to_string())
}
