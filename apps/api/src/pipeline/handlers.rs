use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::errors::AppError;
use crate::models::job::{Job, JobOutput};
use crate::state::AppState;

/// POST /api/v1/jobs
/// Runs one job synchronously and returns its output.
pub async fn handle_run_job(
    State(state): State<AppState>,
    body: Result<Json<Job>, JsonRejection>,
) -> Result<Json<JobOutput>, AppError> {
    let Json(job) = body.map_err(|e| AppError::UnprocessableEntity(e.body_text()))?;
    let output = state.pipeline.run(job).await?;
    Ok(Json(output))
}
