//! HTTP forwarding to the upstream.
//!
//! # Responsibilities
//! - Own the pooled HTTP client and the upgrade listener slot
//! - Classify transport failures (refused, timed out, other)
//! - Finish the tracker of a relayed response when its body ends, or record
//!   a failure when the client closes early

use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use http_body::{Body as _, Frame, SizeHint};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::client::{Request as HandshakeRequest, Response as HandshakeResponse};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::RelayError;
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, HistoryLogger};
use crate::pipeline::{client_closed, Completion};
use crate::proxy::websocket::{ListenerInstall, UpgradeListener};

/// Upstream side of a relayed WebSocket session.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Shared relay state: one client pool and one upgrade listener per gateway.
pub struct ProxyEngine {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    listener: OnceLock<UpgradeListener>,
    history: Arc<dyn HistoryLogger>,
    shutdown: Option<Arc<Shutdown>>,
}

impl ProxyEngine {
    pub fn new(connect_timeout: Duration, history: Arc<dyn HistoryLogger>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            connect_timeout,
            listener: OnceLock::new(),
            history,
            shutdown: None,
        }
    }

    /// Close bridged WebSocket sessions when `shutdown` triggers.
    pub fn with_shutdown(mut self, shutdown: Arc<Shutdown>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Install the upgrade listener unless one already exists. Concurrent
    /// callers race safely; exactly one of them sees `Installed`.
    pub fn install_upgrade_listener(&self) -> (&UpgradeListener, ListenerInstall) {
        let mut installed = false;
        let listener = self.listener.get_or_init(|| {
            installed = true;
            UpgradeListener::spawn(self.history.clone(), self.shutdown.clone())
        });

        let outcome = if installed {
            ListenerInstall::Installed
        } else {
            ListenerInstall::AlreadyInstalled
        };
        (listener, outcome)
    }

    pub fn has_upgrade_listener(&self) -> bool {
        self.listener.get().is_some()
    }

    /// Send a prepared request upstream.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Incoming>, RelayError> {
        self.client
            .request(request)
            .await
            .map_err(|e| RelayError::classify(&e))
    }

    /// Complete the WebSocket handshake with the upstream. Refusals and
    /// timeouts classify the same way as HTTP relay failures.
    pub async fn connect_websocket(
        &self,
        request: HandshakeRequest,
    ) -> Result<(UpstreamSocket, HandshakeResponse), RelayError> {
        match tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok(connected)) => Ok(connected),
            Ok(Err(e)) => Err(RelayError::classify(&e)),
            Err(_) => Err(RelayError::Timeout(format!(
                "no WebSocket handshake within {}s",
                self.connect_timeout.as_secs()
            ))),
        }
    }
}

/// Response body relayed from the upstream.
///
/// Carries the request's [`Completion`]: the tracker is finished with the
/// upstream status when the stream ends, and as a failure when the client
/// drops the body first (499) or the upstream breaks mid-stream (502).
pub struct RelayBody {
    inner: Body,
    path: String,
    status: StatusCode,
    completion: Option<Completion>,
}

impl RelayBody {
    pub fn new(inner: Body, path: impl Into<String>, status: StatusCode, completion: Completion) -> Self {
        Self {
            inner,
            path: path.into(),
            status,
            completion: Some(completion),
        }
    }

    fn complete(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.finish(self.status);
        }
    }

    fn fail(&mut self, status: StatusCode) {
        if let Some(completion) = self.completion.take() {
            completion.fail(status);
        }
    }
}

impl http_body::Body for RelayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(None) => this.complete(),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.complete(),
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(path = %this.path, error = %e, "Upstream body failed while proxying {}", this.path);
                metrics::record_relay_failure("upstream_body");
                this.fail(StatusCode::BAD_GATEWAY);
            }
            _ => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if self.completion.is_none() {
            return;
        }
        // Servers may stop polling once the body reports its end.
        if self.inner.is_end_stream() {
            self.complete();
            return;
        }
        tracing::warn!(path = %self.path, "Http response closed while proxying {}", self.path);
        metrics::record_relay_failure("premature_close");
        self.fail(client_closed());
    }
}
