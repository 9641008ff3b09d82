use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, extract::Extension, http::StatusCode, response::IntoResponse,
    routing::delete, routing::get, routing::post, Json, Router,
};
use serde_json::json;

use crate::handlers::summaries;
use crate::state::AppState;

// Documents are capped by word count; this only bounds the raw request.
const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Build the primary axum router with the provided shared application state.
pub fn build_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/summaries/generate", post(summaries::generate))
        .route("/summaries/queue", post(summaries::enqueue))
        .route("/summaries/queue/stats", get(summaries::queue_stats))
        .route("/summaries/job/{job_id}", get(summaries::job_status))
        .route("/summaries/status", get(summaries::service_status))
        .route("/summaries/cache", delete(summaries::clear_cache))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .layer(Extension(state));

    Router::new().nest("/api", router)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Ready once the completion service has credentials; jobs would only fail otherwise.
async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    if state.service.upstream_configured() {
        (StatusCode::OK, Json(json!({ "ready": true })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": "completion service is not configured" })),
        )
    }
}
