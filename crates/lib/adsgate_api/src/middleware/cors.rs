//! CORS policy: a single allowed origin with credentials.

use std::time::Duration;

use adsgate_core::config::DEFAULT_FRONTEND_URL;
use axum::http::{
    HeaderValue, Method,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Build the CORS layer for `origin`.
///
/// Preflight `OPTIONS` requests are answered here and never reach a handler.
pub fn cors_layer(origin: &str) -> CorsLayer {
    let origin = HeaderValue::from_str(origin).unwrap_or_else(|_| {
        warn!(%origin, "invalid CORS origin, using {DEFAULT_FRONTEND_URL}");
        HeaderValue::from_static(DEFAULT_FRONTEND_URL)
    });

    CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT])
        .max_age(Duration::from_secs(24 * 60 * 60))
}
