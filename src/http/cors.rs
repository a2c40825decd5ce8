//! CORS layer construction.

use std::time::Duration;

use axum::http::{HeaderName, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

/// Mirror the request origin and requested headers; advertise the
/// configured methods.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let methods: Vec<Method> = config
        .allow_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
        .collect();

    let mut layer = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_methods(methods)
        .allow_credentials(config.allow_credentials);

    let exposed: Vec<HeaderName> = config
        .expose_headers
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        .collect();
    if !exposed.is_empty() {
        layer = layer.expose_headers(exposed);
    }

    if let Some(secs) = config.max_age_secs {
        layer = layer.max_age(Duration::from_secs(secs));
    }
    layer
}
