//! Walking geometry helpers and the Walk Directions Provider collaborator.
//!
//! `haversine_m` is the straight-line fallback used whenever no provider is
//! configured or a provider call fails. `WalkDirectionsProvider` is the trait
//! boundary the planner depends on; `MapboxWalkProvider` is the concrete
//! HTTP-backed implementation, modeled on the Mapbox Directions API the
//! original system integrated with.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use utoipa::ToSchema;

const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const WALK_SPEED_KMH: f64 = 5.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let p1 = lat1.to_radians();
    let p2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlmb = (lng2 - lng1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dlmb / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Straight-line walk duration at `WALK_SPEED_KMH`, in whole seconds.
pub fn straight_line_walk_seconds(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> i64 {
    let distance_m = haversine_m(lat1, lng1, lat2, lng2);
    (distance_m / (WALK_SPEED_KMH * 1000.0 / 3600.0)).round() as i64
}

/// One turn-by-turn instruction within a candidate walking route.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalkStep {
    pub name: String,
    pub distance_m: f64,
    pub duration_s: i64,
    pub maneuver: String,
}

/// A candidate walking route as returned by the Walk Directions Provider.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WalkRoute {
    /// `[lng, lat]` pairs, GeoJSON-style.
    pub geometry: Vec<[f64; 2]>,
    pub steps: Vec<WalkStep>,
    pub duration_sec: i64,
    pub summary: Option<String>,
}

/// External collaborator contract for turn-by-turn walking directions.
/// Failure is expressed as `None`/empty — the planner always degrades to a
/// haversine straight line rather than surfacing an error.
#[async_trait]
pub trait WalkDirectionsProvider: Send + Sync {
    /// Up to `1 + alternatives` candidate routes from `from` to `to`
    /// (`(lat, lng)` pairs). Returns `None` on any upstream failure.
    async fn directions(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        alternatives: usize,
    ) -> Option<Vec<WalkRoute>>;
}

/// HTTP client for the Mapbox Directions API (walking profile), the
/// concrete provider the source system integrates with.
pub struct MapboxWalkProvider {
    client: reqwest::Client,
    token: String,
}

impl MapboxWalkProvider {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with static config");
        Self { client, token }
    }
}

#[async_trait]
impl WalkDirectionsProvider for MapboxWalkProvider {
    async fn directions(
        &self,
        from: (f64, f64),
        to: (f64, f64),
        alternatives: usize,
    ) -> Option<Vec<WalkRoute>> {
        let (from_lat, from_lng) = from;
        let (to_lat, to_lng) = to;
        let alternatives_flag = if alternatives > 0 { "true" } else { "false" };
        let url = format!(
            "https://api.mapbox.com/directions/v5/mapbox/walking/{from_lng},{from_lat};{to_lng},{to_lat}\
             ?alternatives={alternatives_flag}&overview=full&geometries=geojson&steps=true&language=en\
             &access_token={token}",
            token = self.token,
        );

        let response = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Walk directions request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Walk directions upstream returned an error status");
            return None;
        }

        let body: MapboxDirectionsResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to parse walk directions response");
                return None;
            }
        };

        if body.routes.is_empty() {
            return None;
        }

        let routes: Vec<WalkRoute> = body
            .routes
            .into_iter()
            .take(1 + alternatives)
            .map(MapboxRoute::into_walk_route)
            .collect();

        Some(routes)
    }
}

#[derive(Debug, Deserialize)]
struct MapboxDirectionsResponse {
    #[serde(default)]
    routes: Vec<MapboxRoute>,
}

#[derive(Debug, Deserialize)]
struct MapboxRoute {
    geometry: MapboxGeometry,
    duration: f64,
    #[serde(default)]
    legs: Vec<MapboxLeg>,
}

impl MapboxRoute {
    fn into_walk_route(self) -> WalkRoute {
        let summary = self.legs.first().and_then(|l| l.summary.clone());
        let steps = self
            .legs
            .into_iter()
            .flat_map(|l| l.steps.into_iter())
            .map(|s| WalkStep {
                name: s.name.unwrap_or_default(),
                distance_m: s.distance,
                duration_s: s.duration.round() as i64,
                maneuver: s.maneuver.and_then(|m| m.instruction).unwrap_or_default(),
            })
            .collect();

        WalkRoute {
            geometry: self.geometry.coordinates,
            steps,
            duration_sec: self.duration.round() as i64,
            summary,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MapboxGeometry {
    #[serde(default)]
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct MapboxLeg {
    summary: Option<String>,
    #[serde(default)]
    steps: Vec<MapboxStep>,
}

#[derive(Debug, Deserialize)]
struct MapboxStep {
    name: Option<String>,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    maneuver: Option<MapboxManeuver>,
}

#[derive(Debug, Deserialize)]
struct MapboxManeuver {
    instruction: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_zero_for_identical_points() {
        assert_eq!(haversine_m(47.65, -122.31, 47.65, -122.31), 0.0);
    }

    #[test]
    fn haversine_matches_known_distance_roughly() {
        // Seattle (47.6062,-122.3321) to Bellevue (47.6101,-122.2015) ~ 100km? actually ~10km
        let d = haversine_m(47.6062, -122.3321, 47.6101, -122.2015);
        assert!(d > 9_000.0 && d < 11_000.0, "distance was {d}");
    }

    #[test]
    fn straight_line_walk_seconds_uses_five_kmh() {
        // 1000m at 5km/h = 720 seconds
        let secs = straight_line_walk_seconds(0.0, 0.0, 0.0, 1000.0 / 111_320.0);
        assert!((secs - 720).abs() <= 2, "secs was {secs}");
    }
}
