//! WebSocket relay.
//!
//! # Data Flow
//! ```text
//! Client ←── frames ──→ Gateway ←── frames ──→ Upstream
//!          (axum WebSocket)      (tokio-tungstenite)
//! ```
//!
//! The relay stage completes the upstream handshake first, so the client
//! only sees a 101 (carrying the subprotocol the upstream chose) once the
//! upstream has accepted. Both sockets are then handed to a single
//! [`UpgradeListener`] task, which bridges every session in its own task.
//!
//! # Design Decisions
//! - Frame-level forwarding, no message buffering
//! - Close frames propagated in both directions
//! - Ping/pong answered locally on each leg, never forwarded
//! - Gateway shutdown closes every open session with 1001 (going away)

use std::sync::Arc;

use axum::extract::ws::{self, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::lifecycle::Shutdown;
use crate::observability::{metrics, HistoryLogger, RequestTracker, WsEvent};
use crate::proxy::relay::UpstreamSocket;

/// Outcome of an attempt to install the upgrade listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerInstall {
    Installed,
    AlreadyInstalled,
}

/// Both legs of an accepted WebSocket relay, waiting to be bridged.
pub struct UpgradeSession {
    pub client: WebSocket,
    pub upstream: UpstreamSocket,
    /// Upstream URL, shown in history lines.
    pub url: String,
}

/// Handle to the task bridging upgraded sessions.
#[derive(Clone)]
pub struct UpgradeListener {
    tx: mpsc::UnboundedSender<UpgradeSession>,
}

impl UpgradeListener {
    /// Start the listener task. Must run inside the runtime.
    pub fn spawn(history: Arc<dyn HistoryLogger>, shutdown: Option<Arc<Shutdown>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UpgradeSession>();
        tokio::spawn(async move {
            while let Some(session) = rx.recv().await {
                let drain = shutdown.as_ref().map(|s| s.subscribe());
                tokio::spawn(bridge(session, history.clone(), drain));
            }
            tracing::debug!("Upgrade listener stopped");
        });
        tracing::debug!("Upgrade listener installed");
        Self { tx }
    }

    /// Queue a session. Returns `false` if the listener is gone.
    pub fn submit(&self, session: UpgradeSession) -> bool {
        self.tx.send(session).is_ok()
    }
}

/// Relay connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Opening,
    Open,
    Sending,
    Receiving,
    Closed,
}

impl WsState {
    /// State after `event`, or `None` if the event is not allowed here.
    pub fn transition(self, event: WsEvent) -> Option<WsState> {
        use WsState::*;
        match (self, event) {
            (Opening, WsEvent::Open) => Some(Open),
            (Open, WsEvent::Send) => Some(Sending),
            (Open, WsEvent::Receive) => Some(Receiving),
            (Open | Sending | Receiving, WsEvent::Close) => Some(Closed),
            _ => None,
        }
    }
}

/// Drives the state machine and reports each accepted event.
pub struct Lifecycle {
    state: WsState,
    url: String,
    history: Arc<dyn HistoryLogger>,
}

impl Lifecycle {
    pub fn new(url: impl Into<String>, history: Arc<dyn HistoryLogger>) -> Self {
        Self {
            state: WsState::Opening,
            url: url.into(),
            history,
        }
    }

    pub fn state(&self) -> WsState {
        self.state
    }

    /// Apply `event`. Returns `false` when it was rejected.
    pub fn emit(&mut self, event: WsEvent) -> bool {
        let Some(next) = self.state.transition(event) else {
            return false;
        };

        metrics::record_ws_event(event);
        self.history.log(&RequestTracker::websocket(event, &self.url));

        // Sending and receiving settle back to open once reported.
        self.state = match next {
            WsState::Sending | WsState::Receiving => WsState::Open,
            other => other,
        };
        true
    }
}

async fn bridge(
    session: UpgradeSession,
    history: Arc<dyn HistoryLogger>,
    mut drain: Option<broadcast::Receiver<()>>,
) {
    let UpgradeSession { client, upstream, url } = session;

    let mut lifecycle = Lifecycle::new(url.clone(), history);
    lifecycle.emit(WsEvent::Open);

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    loop {
        tokio::select! {
            incoming = client_rx.next() => match incoming {
                Some(Ok(msg)) => {
                    let closing = matches!(msg, ws::Message::Close(_));
                    if let Some(out) = to_upstream(msg) {
                        if !closing {
                            lifecycle.emit(WsEvent::Send);
                        }
                        if let Err(e) = upstream_tx.send(out).await {
                            tracing::warn!(upstream = %url, error = %e, "WebSocket send to upstream failed");
                            break;
                        }
                    }
                    if closing {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(upstream = %url, error = %e, "WebSocket client error");
                    break;
                }
                None => break,
            },
            incoming = upstream_rx.next() => match incoming {
                Some(Ok(msg)) => {
                    let closing = matches!(msg, Message::Close(_));
                    if let Some(out) = to_client(msg) {
                        if !closing {
                            lifecycle.emit(WsEvent::Receive);
                        }
                        if let Err(e) = client_tx.send(out).await {
                            tracing::warn!(upstream = %url, error = %e, "WebSocket send to client failed");
                            break;
                        }
                    }
                    if closing {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(upstream = %url, error = %e, "WebSocket upstream error");
                    break;
                }
                None => break,
            },
            _ = draining(&mut drain) => {
                tracing::debug!(upstream = %url, "Closing WebSocket session for shutdown");
                let _ = client_tx
                    .send(ws::Message::Close(Some(ws::CloseFrame {
                        code: ws::close_code::AWAY,
                        reason: "gateway shutting down".into(),
                    })))
                    .await;
                let _ = upstream_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Away,
                        reason: "gateway shutting down".into(),
                    })))
                    .await;
                break;
            },
        }
    }

    lifecycle.emit(WsEvent::Close);
    let _ = client_tx.close().await;
    let _ = upstream_tx.close().await;
}

/// Resolves once shutdown triggers. Sessions without a shutdown handle
/// never drain.
async fn draining(drain: &mut Option<broadcast::Receiver<()>>) {
    match drain {
        Some(rx) => {
            let _ = rx.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn to_upstream(msg: ws::Message) -> Option<Message> {
    match msg {
        ws::Message::Text(text) => Some(Message::Text(text.as_str().to_owned().into())),
        ws::Message::Binary(data) => Some(Message::Binary(data)),
        ws::Message::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        }))),
        ws::Message::Ping(_) | ws::Message::Pong(_) => None,
    }
}

fn to_client(msg: Message) -> Option<ws::Message> {
    match msg {
        Message::Text(text) => Some(ws::Message::Text(text.as_str().to_owned().into())),
        Message::Binary(data) => Some(ws::Message::Binary(data)),
        Message::Close(frame) => Some(ws::Message::Close(frame.map(|f| ws::CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_owned().into(),
        }))),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
