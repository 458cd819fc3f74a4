pub mod routes;

use crate::state::CrowdServiceState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn router(state: CrowdServiceState) -> Router {
    Router::new()
        // Health and metrics endpoints
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        // Configuration and cache inspection
        .route("/v1/config/schema", get(routes::config_schema))
        .route("/v1/cache/stats", get(routes::cache_stats))
        // Analysis endpoints
        .route("/v1/media/:kind/:id/analysis", post(routes::analyze_media))
        .route("/v1/analyze/image", post(routes::analyze_image))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
