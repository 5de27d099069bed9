//! Core entity types shared across the GTFS index, realtime cache, and planner.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A transit stop (from `stops.txt`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Stop {
    pub stop_id: String,
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

/// A transit route (from `routes.txt`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Route {
    pub route_id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub route_type: Option<i32>,
}

impl Route {
    /// Best-effort human-readable label, preferring the short name.
    pub fn display_name(&self) -> String {
        self.short_name
            .clone()
            .or_else(|| self.long_name.clone())
            .unwrap_or_else(|| self.route_id.clone())
    }
}

/// A scheduled run of a route (from `trips.txt`).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub shape_id: Option<String>,
}

/// One stop visit within a trip (from `stop_times.txt`).
///
/// `arrival_sec`/`departure_sec` are seconds since midnight of the service
/// day and may exceed 86400 for trips that run past midnight.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: i32,
    pub arrival_sec: i32,
    pub departure_sec: i32,
}
