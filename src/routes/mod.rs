use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::AppState;

pub mod data;
pub mod health;
pub mod proxy;

/// Build the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Aggregated booking data (CORS-enabled, cache-backed)
        .nest("/api/data", data::router())
        // Webhook relay
        .nest("/api/proxy-post", proxy::router())
        .with_state(state)
        .layer(axum::middleware::from_fn(
            middleware::security_headers::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}
