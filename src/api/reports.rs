use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::reports::{CrowdReport, CrowdReportIn};

use super::AppState;

/// Append a crowd-sourced arrival observation.
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = CrowdReportIn,
    responses(
        (status = 200, description = "Stored report", body = CrowdReport)
    ),
    tag = "reports"
)]
pub async fn create_report(
    State(state): State<Arc<AppState>>,
    Json(report): Json<CrowdReportIn>,
) -> Result<Json<CrowdReport>, AppError> {
    if report.arrival_seconds < 0 {
        return Err(AppError::InvalidInput("arrival_seconds must be non-negative".into()));
    }
    if report.stop_id.trim().is_empty() {
        return Err(AppError::InvalidInput("stop_id must not be empty".into()));
    }
    let stored = state.reports.append(report).await;
    Ok(Json(stored))
}
