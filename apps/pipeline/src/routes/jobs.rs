use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::scheduler::close_with_audit;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub closed: bool,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report_id: Uuid,
    pub report_url: String,
    pub created: bool,
}

/// POST /api/v1/jobs/:job_id/close
/// `closed` is false when the job was already closed.
pub async fn handle_close_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CloseResponse>, AppError> {
    if state.store.job(job_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Job posting {job_id} not found")));
    }
    let closed =
        close_with_audit(state.store.as_ref(), job_id, Utc::now(), "manual", "api").await?;
    Ok(Json(CloseResponse { closed }))
}

/// POST /api/v1/jobs/:job_id/report
pub async fn handle_generate_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ReportResponse>, AppError> {
    let generated = state.reports.generate(job_id).await?;
    Ok(Json(ReportResponse {
        report_id: generated.report.id,
        report_url: generated.report.report_url,
        created: generated.created,
    }))
}
