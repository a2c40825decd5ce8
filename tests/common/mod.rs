//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use devgate::observability::{HistoryLogger, RequestTracker, TrackerStatus};
use devgate::{GatewayBuilder, HttpServer, Shutdown};

/// Records every history entry.
#[derive(Default)]
pub struct RecordingHistory {
    pub entries: Mutex<Vec<RequestTracker>>,
}

impl RecordingHistory {
    /// Status column of every entry, in order.
    pub fn statuses(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.status.map(|s| s.to_string()).unwrap_or_default())
            .collect()
    }

    pub fn ws_events(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|t| match t.status {
                Some(TrackerStatus::Ws(event)) => Some(event.code().to_string()),
                _ => None,
            })
            .collect()
    }
}

impl RecordingHistory {
    /// Wait until at least `count` entries arrived, then return them all.
    pub async fn wait_for(&self, count: usize) -> Vec<RequestTracker> {
        for _ in 0..100 {
            {
                let entries = self.entries.lock().unwrap();
                if entries.len() >= count {
                    return entries.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.entries.lock().unwrap().clone()
    }
}

impl HistoryLogger for RecordingHistory {
    fn log(&self, tracker: &RequestTracker) {
        self.entries.lock().unwrap().push(tracker.clone());
    }
}

/// Running gateway under test.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub history: Arc<RecordingHistory>,
    pub shutdown: Arc<Shutdown>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway on an ephemeral port.
pub async fn spawn_gateway(builder: GatewayBuilder) -> TestGateway {
    let history = Arc::new(RecordingHistory::default());
    let mut config = builder.config().clone();
    config.listener.bind_address = "127.0.0.1:0".to_string();

    let shutdown = Arc::new(Shutdown::new());
    let pipeline = builder
        .history(history.clone())
        .shutdown(shutdown.clone())
        .build()
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(&config, Arc::new(pipeline));
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    TestGateway {
        addr,
        history,
        shutdown,
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

/// Upstream with a few routes exercising relay behaviour.
///
/// - `/hello`: plain text
/// - `/host`: echoes the `Host` header it received
/// - `/old`: redirects to `/new` on its own origin
/// - `/away`: redirects to another origin
/// - `/stream`: three chunks, 150ms apart
pub async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = Router::new()
        .route("/hello", get(|| async { "hello from upstream" }))
        .route(
            "/host",
            get(|headers: HeaderMap| async move {
                headers
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        )
        .route(
            "/old",
            get(|State(addr): State<SocketAddr>| async move {
                Redirect::temporary(&format!("http://{}/new", addr))
            }),
        )
        .route(
            "/away",
            get(|| async { Redirect::temporary("http://example.com/elsewhere") }),
        )
        .route(
            "/stream",
            get(|| async {
                let chunks = futures_util::stream::unfold(0u8, |n| async move {
                    if n == 3 {
                        return None;
                    }
                    if n > 0 {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                    }
                    Some((Ok::<_, std::io::Error>(format!("chunk{}\n", n)), n + 1))
                });
                Body::from_stream(chunks)
            }),
        )
        .fallback(|| async { (StatusCode::NOT_FOUND, "upstream 404").into_response() })
        .with_state(addr);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// Handshake callback selecting the last subprotocol the client offered.
fn select_last_protocol(request: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    let chosen = request
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(|offered| offered.split(',').map(str::trim).filter(|p| !p.is_empty()).last())
        .and_then(|p| HeaderValue::from_str(p).ok());
    if let Some(protocol) = chosen {
        response
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(response)
}

/// WebSocket server echoing text and binary messages. It picks the last
/// subprotocol offered, if any.
pub async fn start_ws_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, select_last_protocol).await
                else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });
    addr
}
