use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub text: String,
    pub max_length: Option<u32>,
    pub style: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRequest {
    #[serde(default)]
    pub text: String,
    pub max_length: Option<u32>,
    pub style: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub owner_id: String,
    pub priority: Option<i32>,
}

/// POST /summaries/generate
/// Summarize now, from cache when possible.
pub async fn generate(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body?;
    let options = state
        .service
        .options(req.max_length, req.style.as_deref())?;
    let outcome = state
        .service
        .synchronous_summarize(&req.text, &options)
        .await?;

    let summary = outcome.summary;
    Ok(Json(json!({
        "success": true,
        "summary": summary.text,
        "statistics": {
            "originalWordCount": summary.original_word_count,
            "summaryWordCount": summary.summary_word_count,
            "compressionRatio": summary.compression_ratio,
        },
        "cached": outcome.cached,
    })))
}

/// POST /summaries/queue
/// Record a background summarize job and return its id.
pub async fn enqueue(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<QueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = body?;
    let options = state
        .service
        .options(req.max_length, req.style.as_deref())?;
    let job_id = state
        .service
        .enqueue_summarize(&req.text, options, &req.owner_id, req.title, req.priority)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "jobId": job_id })),
    ))
}

/// GET /summaries/job/{job_id}
pub async fn job_status(
    Extension(state): Extension<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // a malformed id cannot name a job, so it is reported the same way
    let id = Uuid::parse_str(&job_id)
        .map_err(|_| ApiError::not_found(format!("job {job_id}")))?;
    let view = state
        .service
        .get_job_status(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("job {job_id}")))?;

    Ok(Json(json!({ "success": true, "job": view })))
}

/// GET /summaries/queue/stats
pub async fn queue_stats(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let stats = state.service.get_queue_stats().await;
    Json(json!({ "success": true, "stats": stats }))
}

/// GET /summaries/status
/// Throttle state and whether the completion service has credentials.
pub async fn service_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let throttle = state.service.get_throttle_status();
    Json(json!({
        "success": true,
        "available": throttle.available,
        "cooldownRemaining": throttle.cooldown_remaining,
        "configured": state.service.upstream_configured(),
        "cache": state.service.cache_stats(),
    }))
}

/// DELETE /summaries/cache
pub async fn clear_cache(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let cleared = state.service.clear_cache().await;
    Json(json!({ "success": true, "cleared": cleared }))
}
