//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::middleware::auth_middleware;
use crate::handlers;
use crate::state::AppState;

/// Headroom over the video limit for multipart boundaries and part headers.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Setup all application routes
pub fn setup_routes(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .max_video_size_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    public_routes()
        .merge(protected_routes(state.clone(), body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Public routes (no authentication required)
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/assets/{*key}", get(handlers::assets::get_asset))
}

/// Protected routes (require a bearer token)
fn protected_routes(state: Arc<AppState>, body_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/video_upload/{video_id}",
            post(handlers::video_upload::upload_video).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/videos/{video_id}", get(handlers::video_get::get_video))
        .layer(axum::middleware::from_fn_with_state(
            state.jwt.clone(),
            auth_middleware,
        ))
}
