use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::planner::{Itinerary, PlanRequest};

use super::AppState;

/// Plan an itinerary between two points.
#[utoipa::path(
    post,
    path = "/api/plan",
    request_body = PlanRequest,
    responses(
        (status = 200, description = "Up to 5 ranked itineraries", body = [Itinerary]),
        (status = 404, description = "No itinerary found"),
        (status = 400, description = "Invalid request")
    ),
    tag = "plan"
)]
pub async fn plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<Vec<Itinerary>>, AppError> {
    let itineraries = state.planner.plan(&req).await?;
    Ok(Json(itineraries))
}
