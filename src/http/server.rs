//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a catch-all handler
//! - Wire up middleware (request ID, tracing, CORS)
//! - Hand every request to the pipeline
//! - Serve with graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::cors::cors_layer;
use crate::pipeline::Pipeline;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// HTTP front of the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, pipeline: Arc<Pipeline>) -> Self {
        let router = Self::build_router(config, AppState { pipeline });
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/", any(gateway_handler))
            .route("/{*path}", any(gateway_handler))
            .with_state(state);

        let router = if config.cors.enabled {
            router.layer(cors_layer(&config.cors))
        } else {
            router
        };

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    state.pipeline.dispatch(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Exchange, Next, Stage};
    use crate::error::GatewayError;
    use crate::testing::{body_text, CollectHistory};
    use async_trait::async_trait;
    use axum::http::{header, Method, StatusCode};
    use tower::ServiceExt;

    struct Hello;

    #[async_trait]
    impl Stage for Hello {
        async fn handle(&self, exchange: &mut Exchange, _: Next<'_>) -> Result<(), GatewayError> {
            exchange.set_body(format!("hello {}", exchange.path()));
            Ok(())
        }
    }

    fn server(config: &GatewayConfig) -> HttpServer {
        let pipeline = Pipeline::builder()
            .stage(Hello)
            .history(Arc::new(CollectHistory::default()))
            .build();
        HttpServer::new(config, Arc::new(pipeline))
    }

    #[tokio::test]
    async fn every_path_reaches_the_pipeline() {
        let router = server(&GatewayConfig::default()).router();

        for path in ["/", "/deep/nested/path"] {
            let response = router
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().contains_key("x-request-id"));
            assert_eq!(body_text(response).await, format!("hello {}", path));
        }
    }

    #[tokio::test]
    async fn cors_mirrors_the_origin() {
        let router = server(&GatewayConfig::default()).router();
        let response = router
            .oneshot(
                Request::get("/x")
                    .header(header::ORIGIN, "http://app.local:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://app.local:5173"
        );
    }

    #[tokio::test]
    async fn preflight_is_answered_by_the_cors_layer() {
        let router = server(&GatewayConfig::default()).router();
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api")
                    .header(header::ORIGIN, "http://app.local")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        assert!(allowed.contains("PATCH"));
    }

    #[tokio::test]
    async fn cors_can_be_disabled() {
        let mut config = GatewayConfig::default();
        config.cors.enabled = false;
        let response = server(&config)
            .router()
            .oneshot(
                Request::get("/x")
                    .header(header::ORIGIN, "http://app.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
