use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub healthy: bool,
    pub gtfs_stop_count: usize,
    pub gtfs_route_count: usize,
    pub gtfs_trip_count: usize,
    pub realtime_configured: bool,
    pub walk_directions_configured: bool,
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        gtfs_stop_count: state.index.stops.len(),
        gtfs_route_count: state.index.routes.len(),
        gtfs_trip_count: state.index.trips.len(),
        realtime_configured: state.realtime_configured,
        walk_directions_configured: state.walk_provider.is_some(),
    })
}
