use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::AppError;
use crate::eta::EtaResult;

use super::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct EtaQuery {
    pub stop_id: String,
    pub line_id: Option<String>,
    pub origin_lat: Option<f64>,
    pub origin_lng: Option<f64>,
}

/// Estimate the next arrival at a stop, fusing crowd reports with the
/// realtime delay cache and falling back to a flat headway.
#[utoipa::path(
    get,
    path = "/api/eta",
    params(EtaQuery),
    responses(
        (status = 200, description = "Fused ETA for the stop", body = EtaResult),
        (status = 404, description = "Unknown stop")
    ),
    tag = "eta"
)]
pub async fn eta(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EtaQuery>,
) -> Result<Json<EtaResult>, AppError> {
    let origin = match (query.origin_lat, query.origin_lng) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        _ => None,
    };
    let result = state
        .estimator
        .eta(&query.stop_id, query.line_id.as_deref(), origin)
        .await?;
    Ok(Json(result))
}
