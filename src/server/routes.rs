//! Router configuration for the analysis endpoint.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Largest accepted request body. A 1.5x-scaled A4 page as JPEG is well
/// under this.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/analyze-page", post(handlers::analyze_page))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
