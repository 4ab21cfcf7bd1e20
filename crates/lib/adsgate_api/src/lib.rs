//! # adsgate_api
//!
//! HTTP surface of the Google Ads gateway.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use adsgate_core::ads::AdsForwarder;
use adsgate_core::auth::TokenRefresher;
use adsgate_core::config::GatewayConfig;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{ads, health, not_found, oauth};
use crate::middleware::cors::cors_layer;
use crate::middleware::rate_limit::{RateLimiter, rate_limit};

/// Route paths.
pub mod routes {
    pub const POST_ADS_SEARCH: &str = "/api/ads/search";
    pub const GET_ADS_CUSTOMERS: &str = "/api/ads/customers";
    pub const GET_ADS_TEST_AUTH: &str = "/api/ads/test-auth";
    pub const GET_HEALTH: &str = "/api/health";
    pub const GET_OAUTH_CALLBACK: &str = "/api/oauth/callback";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// Access-token source for upstream calls.
    pub tokens: Arc<TokenRefresher>,
    /// Upstream Ads API client.
    pub forwarder: Arc<AdsForwarder>,
    /// Per-IP limiter for the ads routes.
    pub rate_limiter: Arc<RateLimiter>,
    /// Outbound HTTP client (token endpoint).
    pub http: reqwest::Client,
}

impl AppState {
    /// Build state whose token refresher constructs its auth client from `config`.
    pub fn new(config: GatewayConfig, http: reqwest::Client) -> Self {
        let tokens = TokenRefresher::new(config.auth.clone(), http.clone());
        Self::with_tokens(config, Arc::new(tokens), http)
    }

    /// Build state around an existing token refresher.
    pub fn with_tokens(
        config: GatewayConfig,
        tokens: Arc<TokenRefresher>,
        http: reqwest::Client,
    ) -> Self {
        let forwarder = AdsForwarder::new(config.ads.clone(), http.clone());
        let rate_limiter = RateLimiter::new(config.rate_limit);
        Self {
            config: Arc::new(config),
            tokens,
            forwarder: Arc::new(forwarder),
            rate_limiter: Arc::new(rate_limiter),
            http,
        }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);
    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);

    // Rate-limited ads routes
    let ads = Router::new()
        .route(routes::POST_ADS_SEARCH, post(ads::search_handler))
        .route(routes::GET_ADS_CUSTOMERS, get(ads::customers_handler))
        .route(routes::GET_ADS_TEST_AUTH, get(ads::test_auth_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit,
        ));

    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::GET_OAUTH_CALLBACK, get(oauth::oauth_callback_handler));

    Router::new()
        .merge(ads)
        .merge(public)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(cors)
        .with_state(state)
}
