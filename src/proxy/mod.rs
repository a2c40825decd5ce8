//! Upstream relay stage.
//!
//! # Data Flow
//! ```text
//! Exchange
//!     → filter (rejected → next stage)
//!     → ensure upgrade listener (when WebSocket relay is on)
//!     → rewrite path → upstream URL, tracker marked `proxy`
//!     → upgrade request?  → upstream handshake → 101 with the upstream's
//!                           subprotocol → UpgradeListener
//!     → otherwise         → ProxyEngine::forward
//!                           → redirect Location rewrite
//!                           → body streamed back through RelayBody, which
//!                             finishes the tracker when the stream ends
//! ```
//!
//! Transport failures, including a failed upstream WebSocket handshake,
//! answer 503 (refused), 504 (timed out) or 500 with a JSON error payload.
//! Nothing is retried.

pub mod headers;
pub mod redirect;
pub mod relay;
pub mod websocket;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::FromRequestParts;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, Uri};
use axum::response::IntoResponse;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use url::Url;

pub use redirect::rewrite_location;
pub use relay::{ProxyEngine, RelayBody, UpstreamSocket};
pub use websocket::{ListenerInstall, UpgradeListener, UpgradeSession, WsState};

use crate::config::validation::{validate_target, ValidationError};
use crate::config::ProxyConfig;
use crate::error::{GatewayError, RelayError};
use crate::http::response::error_body;
use crate::observability::{metrics, Target};
use crate::pipeline::{Exchange, Next, Stage};
use headers::{strip_hop_by_hop, websocket_forwardable};

/// Decides whether a request is relayed at all.
pub type ProxyFilter = Arc<dyn Fn(&Exchange) -> bool + Send + Sync>;

/// Maps the forwarded path-and-query before it is joined to the target.
pub type PathRewrite = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Final stage: relays to the upstream.
pub struct ProxyRelay {
    engine: Arc<ProxyEngine>,
    target: Url,
    websocket: bool,
    change_origin: bool,
    filter: Option<ProxyFilter>,
    rewrite: Option<PathRewrite>,
}

impl ProxyRelay {
    pub fn new(config: &ProxyConfig, engine: Arc<ProxyEngine>) -> Result<Self, ValidationError> {
        Ok(Self {
            engine,
            target: validate_target(&config.target)?,
            websocket: config.websocket,
            change_origin: config.change_origin,
            filter: None,
            rewrite: None,
        })
    }

    pub fn with_filter(mut self, filter: ProxyFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_rewrite(mut self, rewrite: PathRewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    pub fn engine(&self) -> &Arc<ProxyEngine> {
        &self.engine
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    async fn relay(&self, exchange: &mut Exchange, upstream: &str) -> Result<(), RelayError> {
        let uri: Uri = upstream
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| RelayError::InvalidRequest(e.to_string()))?;

        let mut headers = exchange.headers().clone();
        strip_hop_by_hop(&mut headers);
        if self.change_origin {
            if let Some(authority) = uri.authority() {
                let host = HeaderValue::from_str(authority.as_str())
                    .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;
                headers.insert(header::HOST, host);
            }
        }

        let mut request = Request::new(exchange.take_body().unwrap_or_else(Body::empty));
        *request.method_mut() = exchange.method().clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;

        let response = self.engine.forward(request).await?;
        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        if parts.status.is_redirection() {
            if let Some(host) = exchange.host() {
                self.rewrite_redirect(&mut parts.headers, host);
            }
        }

        exchange.set_response(Response::from_parts(parts, Body::new(body)));
        exchange.defer_completion();
        Ok(())
    }

    fn rewrite_redirect(&self, headers: &mut HeaderMap, host: &str) {
        let Some(location) = headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };

        if let Some(rewritten) = rewrite_location(location, &self.target, host) {
            if let Ok(value) = HeaderValue::from_str(&rewritten) {
                tracing::debug!(from = %location, to = %rewritten, "Redirect rewritten");
                headers.insert(header::LOCATION, value);
            }
        }
    }

    async fn upgrade(&self, exchange: &mut Exchange, forwarded: &str) -> Result<(), RelayError> {
        let ws = match WebSocketUpgrade::from_request_parts(exchange.parts_mut(), &()).await {
            Ok(ws) => ws,
            Err(rejection) => {
                exchange.set_response(rejection.into_response());
                return Ok(());
            }
        };

        let upstream = websocket_url(&self.target, forwarded)?;
        let mut handshake = upstream
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;
        for (name, value) in exchange.headers() {
            if websocket_forwardable(name) {
                handshake.headers_mut().append(name.clone(), value.clone());
            }
        }

        // The client gets its 101 only after the upstream accepted.
        let (socket, accepted) = self.engine.connect_websocket(handshake).await?;
        let ws = match accepted
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
        {
            Some(protocol) => ws.protocols([protocol.to_string()]),
            None => ws,
        };

        let (listener, _) = self.engine.install_upgrade_listener();
        let listener = listener.clone();
        let url = upstream.to_string();
        let response = ws.on_upgrade(move |client| async move {
            let session = UpgradeSession {
                client,
                upstream: socket,
                url: url.clone(),
            };
            if !listener.submit(session) {
                tracing::warn!(upstream = %url, "Upgrade listener unavailable");
            }
        });
        exchange.set_response(response);
        Ok(())
    }

    fn fail(&self, exchange: &mut Exchange, err: RelayError) {
        tracing::warn!(
            path = %exchange.original_url(),
            target = %self.target,
            error = %err,
            "Relay failed"
        );
        metrics::record_relay_failure(err.kind());
        exchange.set_status(err.status());
        exchange.set_json(&error_body(&err.to_string(), None));
    }
}

#[async_trait]
impl Stage for ProxyRelay {
    async fn handle(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), GatewayError> {
        if let Some(filter) = &self.filter {
            if !filter(exchange) {
                return next.run(exchange).await;
            }
        }

        if self.websocket {
            self.engine.install_upgrade_listener();
        }

        let path_and_query = exchange.path_and_query();
        let forwarded = match &self.rewrite {
            Some(rewrite) => rewrite(&path_and_query),
            None => path_and_query,
        };
        let upstream = join_target(&self.target, &forwarded);
        let log = format!("{} -> {}", exchange.original_url(), upstream);
        exchange.tracker.mark(Target::Proxy, log);

        let outcome = if self.websocket && is_upgrade_request(exchange.headers()) {
            self.upgrade(exchange, &forwarded).await
        } else {
            self.relay(exchange, &upstream).await
        };

        if let Err(err) = outcome {
            self.fail(exchange, err);
        }
        Ok(())
    }
}

/// Join the target origin (and base path) with a path-and-query.
pub fn join_target(target: &Url, path_and_query: &str) -> String {
    let base = target.as_str().trim_end_matches('/');
    if path_and_query.starts_with('/') {
        format!("{}{}", base, path_and_query)
    } else {
        format!("{}/{}", base, path_and_query)
    }
}

/// Upstream WebSocket URL for a forwarded path.
pub fn websocket_url(target: &Url, path_and_query: &str) -> Result<Url, RelayError> {
    let mut url = Url::parse(&join_target(target, path_and_query))
        .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;
    url.set_scheme("ws")
        .map_err(|()| RelayError::InvalidRequest(format!("cannot use ws:// for {}", target)))?;
    Ok(url)
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}
