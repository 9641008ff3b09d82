use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::{response::IntoResponse, Json};
use precis_summarizer::SummarizeError;
use serde_json::json;
use thiserror::Error;

/// Top-level API error shared by all route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Summarize(SummarizeError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Summarize(SummarizeError::Configuration(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Summarize(SummarizeError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Summarize(SummarizeError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Summarize(e) => e.kind(),
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "invalid_input",
        }
    }
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(d: std::time::Duration) -> u64 {
    (d.as_secs() + u64::from(d.subsec_nanos() > 0)).max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::Summarize(e) => e.retry_after().map(retry_after_secs),
            _ => None,
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), kind = self.kind(), error = %self, "request failed");
        }

        let mut payload = json!({
            "success": false,
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let Some(secs) = retry_after {
            payload["retryAfter"] = json!(secs);
        }

        let mut response = (status, Json(payload)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
