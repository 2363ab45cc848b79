use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reelsmith_core::CoreError;
use reelsmith_pipeline::PipelineError;
use reelsmith_provider::StageError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent
/// `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `reelsmith_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A failure while running a stage, extracting a frame or merging.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The request conflicts with the current state of a run.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Pipeline(err) => classify_pipeline_error(err),
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Validation errors are the caller's; everything else is bookkeeping and
/// never shown to the caller.
fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        other => {
            tracing::error!(error = %other, "Bookkeeping error");
            internal()
        }
    }
}

fn classify_pipeline_error(err: &PipelineError) -> (StatusCode, &'static str, String) {
    match err {
        PipelineError::StageCallFailed {
            source: StageError::Timeout { .. },
            ..
        } => (StatusCode::GATEWAY_TIMEOUT, "STAGE_TIMEOUT", err.to_string()),
        PipelineError::StageCallFailed { .. } => {
            (StatusCode::BAD_GATEWAY, "STAGE_FAILED", err.to_string())
        }
        PipelineError::InvalidStoryboard(_) => {
            (StatusCode::BAD_GATEWAY, "INVALID_STORYBOARD", err.to_string())
        }
        PipelineError::FrameExtractionFailed { .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "FRAME_EXTRACTION_FAILED",
            err.to_string(),
        ),
        PipelineError::MergeFailed { unreadable, reason } => {
            let message = if unreadable.is_empty() {
                format!("Merge failed: {reason}")
            } else {
                format!("Merge failed: {reason} ({})", unreadable.join(", "))
            };
            (StatusCode::UNPROCESSABLE_ENTITY, "MERGE_FAILED", message)
        }
        PipelineError::Cancelled => (StatusCode::CONFLICT, "CANCELLED", err.to_string()),
        PipelineError::Bookkeeping(core) => classify_core_error(core),
        PipelineError::Checkpoint(msg) => {
            tracing::error!(error = %msg, "Checkpoint error");
            internal()
        }
    }
}
