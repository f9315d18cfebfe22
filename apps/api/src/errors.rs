use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::pipeline::state::Stage;
use crate::pipeline::store::StoreError;
use crate::signals::cache::CacheError;

// ────────────────────────────────────────────────────────────────────────────
// Pipeline failures
// ────────────────────────────────────────────────────────────────────────────

/// Job-fatal errors a stage can raise. Degradable conditions never surface
/// here; stages absorb them and record a flag instead.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    CacheCorrupt(#[from] CacheError),

    #[error(transparent)]
    StoreCorrupt(#[from] StoreError),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl StageError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StageError::InvalidInput(_) => FailureKind::InvalidInput,
            StageError::CacheCorrupt(_) => FailureKind::CacheCorrupt,
            StageError::StoreCorrupt(_) => FailureKind::StoreCorrupt,
            StageError::InvariantViolation(_) => FailureKind::InvariantViolation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    CacheCorrupt,
    StoreCorrupt,
    InvariantViolation,
    Timeout,
}

/// The only failure a caller of `Pipeline::run` ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("job {job_id} failed at {stage}: {message}")]
pub struct FailureReason {
    pub job_id: String,
    /// Stage that was running when the job failed.
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP
// ────────────────────────────────────────────────────────────────────────────

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// Any pipeline failure other than invalid input, store and cache corruption included.
    #[error("Job failed: {0}")]
    JobFailed(FailureReason),
}

impl From<FailureReason> for AppError {
    fn from(reason: FailureReason) -> Self {
        match reason.kind {
            FailureKind::InvalidInput => AppError::Validation(reason.message),
            _ => AppError::JobFailed(reason),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::JobFailed(reason) if reason.kind == FailureKind::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "JOB_TIMEOUT",
                format!("Job deadline exceeded during {}", reason.stage),
            ),
            AppError::JobFailed(reason) => {
                tracing::error!("Job failed: {reason}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "JOB_FAILED",
                    format!("Job failed during {}", reason.stage),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
