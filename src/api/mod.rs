//! Thin axum adapter: deserializes typed requests, calls into the core
//! engine (`Estimator`, `Planner`, `ReportStore`), serializes responses.
//! Business logic lives in the core modules, not here — see `crate::error`
//! for the single place `AppError` maps onto HTTP status codes.

pub mod eta;
pub mod health;
pub mod plan;
pub mod reports;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::eta::Estimator;
use crate::gtfs::GtfsIndex;
use crate::planner::Planner;
use crate::reports::ReportStore;
use crate::walk::WalkDirectionsProvider;

/// Shared application state, built once at startup and cloned (cheaply,
/// behind `Arc`) into every request.
pub struct AppState {
    pub index: Arc<GtfsIndex>,
    pub estimator: Arc<Estimator>,
    pub planner: Arc<Planner>,
    pub reports: Arc<dyn ReportStore>,
    pub realtime_configured: bool,
    pub walk_provider: Option<Arc<dyn WalkDirectionsProvider>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/plan", post(plan::plan))
        .route("/eta", get(eta::eta))
        .route("/reports", post(reports::create_report))
        .with_state(state)
}
