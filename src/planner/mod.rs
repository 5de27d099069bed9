//! Itinerary planner: direct and one-transfer trip search over the static
//! index, optionally enhanced with real walking directions and a
//! safety-aware bias on which walking route to choose.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::gtfs::GtfsIndex;
use crate::model::Stop;
use crate::realtime::{DelayCache, DelaySnapshot};
use crate::safety::SafetyOverlay;
use crate::walk::{haversine_m, straight_line_walk_seconds, WalkDirectionsProvider, WalkRoute, WalkStep};

const NEAREST_STOP_LIMIT: usize = 10;
const ORIGIN_CANDIDATES: usize = 6;
const DEST_CANDIDATES: usize = 6;
const DIRECT_TRIPS_PER_PAIR: usize = 2;
const TRANSFER_TRIPS_PER_PAIR: usize = 2;
const INTERCHANGE_CANDIDATES: usize = 100;
const TRANSFER_BUFFER_SECS: i64 = 120;
const DEPARTURE_SLACK_SECS: i64 = 90;
const MAX_ITINERARIES: usize = 5;
const DEFAULT_STRICT_REJECT_THRESHOLD: f64 = 0.40;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegMode {
    Walk,
    Transit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SafetyMode {
    Off,
    Prefer,
    Strict,
}

impl Default for SafetyMode {
    fn default() -> Self {
        SafetyMode::Off
    }
}

impl SafetyMode {
    fn bias_factor(self, safety_score: f64) -> f64 {
        match self {
            SafetyMode::Off => 1.0,
            SafetyMode::Prefer => 1.0 + (1.0 - safety_score) * 0.3,
            SafetyMode::Strict => 1.0 + (1.0 - safety_score) * 0.6,
        }
    }

    fn biases(self) -> bool {
        !matches!(self, SafetyMode::Off)
    }
}

/// One candidate walking option attached to an enhanced leg, retained for
/// display alongside the chosen route.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalkAltOption {
    pub geometry: Vec<[f64; 2]>,
    pub steps: Vec<WalkStep>,
    pub duration_sec: i64,
    pub safety_score: Option<f64>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Leg {
    pub mode: LegMode,
    pub from_name: String,
    pub to_name: String,
    pub from_lat: f64,
    pub from_lng: f64,
    pub to_lat: f64,
    pub to_lng: f64,
    pub route: Option<String>,
    pub trip_id: Option<String>,
    pub dep_time: Option<String>,
    pub arr_time: Option<String>,
    pub duration_sec: i64,
    pub geometry: Option<Vec<[f64; 2]>>,
    pub steps: Option<Vec<WalkStep>>,
    pub safety_score: Option<f64>,
    pub walk_summary: Option<String>,
    pub alt_options: Option<Vec<WalkAltOption>>,
}

impl Leg {
    fn walk(from_name: &str, from: (f64, f64), to_name: &str, to: (f64, f64)) -> Self {
        let duration_sec = straight_line_walk_seconds(from.0, from.1, to.0, to.1).max(0);
        Self {
            mode: LegMode::Walk,
            from_name: from_name.to_string(),
            to_name: to_name.to_string(),
            from_lat: from.0,
            from_lng: from.1,
            to_lat: to.0,
            to_lng: to.1,
            route: None,
            trip_id: None,
            dep_time: None,
            arr_time: None,
            duration_sec,
            geometry: None,
            steps: None,
            safety_score: None,
            walk_summary: None,
            alt_options: None,
        }
    }

    fn coords_from(&self) -> (f64, f64) {
        (self.from_lat, self.from_lng)
    }

    fn coords_to(&self) -> (f64, f64) {
        (self.to_lat, self.to_lng)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Itinerary {
    pub duration_sec: i64,
    pub depart_time: String,
    pub arrive_time: String,
    pub transfers: i32,
    pub legs: Vec<Leg>,
    pub notes: Option<String>,
}

impl Itinerary {
    fn recompute_duration(&mut self) {
        self.duration_sec = self.legs.iter().map(|l| l.duration_sec).sum();
    }

    fn min_walk_safety(&self) -> Option<f64> {
        self.legs
            .iter()
            .filter(|l| l.mode == LegMode::Walk)
            .filter_map(|l| l.safety_score)
            .fold(None, |acc, s| Some(acc.map_or(s, |a: f64| a.min(s))))
    }

    fn avg_walk_safety(&self) -> f64 {
        let scores: Vec<f64> = self
            .legs
            .iter()
            .filter(|l| l.mode == LegMode::Walk)
            .filter_map(|l| l.safety_score)
            .collect();
        if scores.is_empty() {
            0.5
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }
}

/// Inbound `plan()` request, as received from the HTTP adapter.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PlanRequest {
    pub origin_lat: f64,
    pub origin_lng: f64,
    pub destination_lat: f64,
    pub destination_lng: f64,
    /// Seconds since local midnight to depart after. Defaults to "now".
    pub depart_after_sec: Option<i64>,
    #[serde(default)]
    pub max_transfers: i32,
    pub max_walk_m: Option<f64>,
    #[serde(default = "default_true")]
    pub use_realtime: bool,
    #[serde(default)]
    pub enhance_walk: bool,
    #[serde(default)]
    pub walk_alternatives: usize,
    #[serde(default)]
    pub safety: SafetyMode,
    pub reject_walk_below: Option<f64>,
    #[serde(default = "default_true")]
    pub allow_walk_only: bool,
    #[serde(default = "default_walk_only_max_m")]
    pub walk_only_max_m: f64,
}

fn default_true() -> bool {
    true
}

fn default_walk_only_max_m() -> f64 {
    5000.0
}

struct DirectTrip {
    trip_id: String,
    route_id: String,
    dep: i64,
    arr: i64,
}

pub struct Planner {
    index: Arc<GtfsIndex>,
    delays: Arc<DelayCache>,
    safety: Arc<SafetyOverlay>,
    walk_provider: Option<Arc<dyn WalkDirectionsProvider>>,
    default_max_walk_m: f64,
}

impl Planner {
    pub fn new(
        index: Arc<GtfsIndex>,
        delays: Arc<DelayCache>,
        safety: Arc<SafetyOverlay>,
        walk_provider: Option<Arc<dyn WalkDirectionsProvider>>,
        default_max_walk_m: f64,
    ) -> Self {
        Self { index, delays, safety, walk_provider, default_max_walk_m }
    }

    pub async fn plan(&self, req: &PlanRequest) -> Result<Vec<Itinerary>, AppError> {
        if !req.origin_lat.is_finite()
            || !req.origin_lng.is_finite()
            || !req.destination_lat.is_finite()
            || !req.destination_lng.is_finite()
        {
            return Err(AppError::InvalidInput("coordinates must be finite".into()));
        }
        if !(0..=1).contains(&req.max_transfers) {
            return Err(AppError::InvalidInput("max_transfers must be 0 or 1".into()));
        }
        if req.walk_alternatives > 5 {
            return Err(AppError::InvalidInput("walk_alternatives must be <= 5".into()));
        }

        let origin = (req.origin_lat, req.origin_lng);
        let destination = (req.destination_lat, req.destination_lng);
        let max_walk_m = req.max_walk_m.unwrap_or(self.default_max_walk_m);
        let depart_after = req.depart_after_sec.unwrap_or_else(seconds_since_local_midnight);
        let reject_walk_below = req.reject_walk_below.or(match req.safety {
            SafetyMode::Strict => Some(DEFAULT_STRICT_REJECT_THRESHOLD),
            _ => None,
        });

        let snapshot = self.delays.snapshot().await;

        let mut itineraries = self.plan_direct(origin, destination, depart_after, max_walk_m, req.use_realtime, &snapshot);

        if req.max_transfers >= 1 && itineraries.len() < 3 {
            itineraries.extend(self.plan_one_transfer(
                origin,
                destination,
                depart_after,
                max_walk_m,
                req.use_realtime,
                &snapshot,
            ));
        }

        if itineraries.is_empty() {
            return self
                .walk_only_fallback(origin, destination, depart_after, req, reject_walk_below)
                .await;
        }

        if req.enhance_walk {
            self.enhance_walk_legs(&mut itineraries, req.walk_alternatives, req.safety).await;
        }

        self.annotate_safety(&mut itineraries, req.safety).await;

        if let Some(threshold) = reject_walk_below {
            itineraries.retain(|it| match it.min_walk_safety() {
                Some(min) => min >= threshold,
                None => true,
            });
            if itineraries.is_empty() {
                return Err(AppError::NotFound(format!(
                    "all candidate itineraries were rejected by the safety filter (threshold={threshold})"
                )));
            }
        }

        for it in &mut itineraries {
            it.recompute_duration();
        }

        self.sort_itineraries(&mut itineraries, req.safety);
        itineraries.truncate(MAX_ITINERARIES);
        Ok(itineraries)
    }

    fn nearest_stops(&self, point: (f64, f64), max_m: f64) -> Vec<(String, f64)> {
        let mut rows: Vec<(String, f64)> = self
            .index
            .stops
            .values()
            .map(|s| (s.stop_id.clone(), haversine_m(point.0, point.1, s.lat, s.lng)))
            .filter(|(_, d)| *d <= max_m)
            .collect();
        rows.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        rows.truncate(NEAREST_STOP_LIMIT);
        rows
    }

    fn find_direct_trips(
        &self,
        o_stop: &str,
        d_stop: &str,
        depart_after: i64,
        use_realtime: bool,
        snapshot: &DelaySnapshot,
    ) -> Vec<DirectTrip> {
        let mut candidates = Vec::new();
        let Some(o_routes) = self.index.routes_by_stop.get(o_stop) else { return candidates };
        let Some(d_routes) = self.index.routes_by_stop.get(d_stop) else { return candidates };

        for route_id in o_routes.intersection(d_routes) {
            let Some(trip_ids) = self.index.trips_by_route.get(route_id) else { continue };
            for trip_id in trip_ids {
                let Some(sts) = self.index.stop_times_by_trip.get(trip_id) else { continue };
                let o_row = sts.iter().find(|st| st.stop_id == o_stop);
                let d_row = sts.iter().find(|st| st.stop_id == d_stop);
                let (Some(o_row), Some(d_row)) = (o_row, d_row) else { continue };
                if o_row.stop_sequence >= d_row.stop_sequence {
                    continue;
                }

                let delay_o = if use_realtime { snapshot.adjustment(trip_id, o_stop) as i64 } else { 0 };
                let delay_d = if use_realtime { snapshot.adjustment(trip_id, d_stop) as i64 } else { 0 };
                let dep = o_row.departure_sec as i64 + delay_o;
                let arr = d_row.arrival_sec as i64 + delay_d;

                if dep >= depart_after - DEPARTURE_SLACK_SECS {
                    candidates.push(DirectTrip {
                        trip_id: trip_id.clone(),
                        route_id: route_id.clone(),
                        dep,
                        arr,
                    });
                }
            }
        }

        candidates.sort_by_key(|c| c.arr);
        candidates
    }

    fn plan_direct(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        depart_after: i64,
        max_walk_m: f64,
        use_realtime: bool,
        snapshot: &DelaySnapshot,
    ) -> Vec<Itinerary> {
        let near_o = self.nearest_stops(origin, max_walk_m);
        let near_d = self.nearest_stops(destination, max_walk_m);
        if near_o.is_empty() || near_d.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for (o_stop, _) in near_o.iter().take(ORIGIN_CANDIDATES) {
            for (d_stop, _) in near_d.iter().take(DEST_CANDIDATES) {
                if o_stop == d_stop {
                    continue;
                }
                let trips = self.find_direct_trips(o_stop, d_stop, depart_after, use_realtime, snapshot);
                for trip in trips.into_iter().take(DIRECT_TRIPS_PER_PAIR) {
                    let Some(o) = self.index.stops.get(o_stop) else { continue };
                    let Some(d) = self.index.stops.get(d_stop) else { continue };
                    let walk1 = Leg::walk("Origin", origin, stop_label(o), (o.lat, o.lng));
                    let ride = self.build_transit_leg(o, d, &trip);
                    let walk2 = Leg::walk(stop_label(d), (d.lat, d.lng), "Destination", destination);

                    let depart_time = depart_after.max(trip.dep - walk1.duration_sec);
                    let arrive_time = trip.arr + walk2.duration_sec;
                    let total = walk1.duration_sec + (trip.arr - trip.dep) + walk2.duration_sec;

                    out.push(Itinerary {
                        duration_sec: total,
                        depart_time: format_hhmm(depart_time),
                        arrive_time: format_hhmm(arrive_time),
                        transfers: 0,
                        legs: vec![walk1, ride, walk2],
                        notes: Some("Direct route".to_string()),
                    });
                }
            }
        }

        out.sort_by_key(|i| i.duration_sec);
        dedup_by_key(out, |it| {
            (it.legs[1].route.clone(), it.depart_time.clone(), it.arrive_time.clone())
        })
        .into_iter()
        .take(MAX_ITINERARIES)
        .collect()
    }

    fn plan_one_transfer(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        depart_after: i64,
        max_walk_m: f64,
        use_realtime: bool,
        snapshot: &DelaySnapshot,
    ) -> Vec<Itinerary> {
        let near_o = self.nearest_stops(origin, max_walk_m);
        let near_d = self.nearest_stops(destination, max_walk_m);
        if near_o.is_empty() || near_d.is_empty() {
            return Vec::new();
        }

        let interchanges = self.index.busiest_stops(INTERCHANGE_CANDIDATES);
        let mut out = Vec::new();

        for (o_stop, _) in near_o.iter().take(ORIGIN_CANDIDATES) {
            for x_stop in &interchanges {
                if o_stop == x_stop {
                    continue;
                }
                let first_legs = self.find_direct_trips(o_stop, x_stop, depart_after, use_realtime, snapshot);
                for t1 in first_legs.into_iter().take(TRANSFER_TRIPS_PER_PAIR) {
                    let transfer_ready = t1.arr + TRANSFER_BUFFER_SECS;
                    for (d_stop, _) in near_d.iter().take(DEST_CANDIDATES) {
                        if d_stop == x_stop {
                            continue;
                        }
                        let second_legs =
                            self.find_direct_trips(x_stop, d_stop, transfer_ready, use_realtime, snapshot);
                        let Some(t2) = second_legs.into_iter().next() else { continue };

                        let (Some(o), Some(x), Some(d)) = (
                            self.index.stops.get(o_stop),
                            self.index.stops.get(x_stop),
                            self.index.stops.get(d_stop),
                        ) else {
                            continue;
                        };

                        let walk1 = Leg::walk("Origin", origin, stop_label(o), (o.lat, o.lng));
                        let ride1 = self.build_transit_leg(o, x, &t1);
                        let ride2 = self.build_transit_leg(x, d, &t2);
                        let walk2 = Leg::walk(stop_label(d), (d.lat, d.lng), "Destination", destination);

                        let depart_time = depart_after.max(t1.dep - walk1.duration_sec);
                        let arrive_time = t2.arr + walk2.duration_sec;
                        let total = walk1.duration_sec
                            + (t1.arr - t1.dep)
                            + (t2.arr - t2.dep)
                            + walk2.duration_sec;

                        out.push(Itinerary {
                            duration_sec: total,
                            depart_time: format_hhmm(depart_time),
                            arrive_time: format_hhmm(arrive_time),
                            transfers: 1,
                            legs: vec![walk1, ride1, ride2, walk2],
                            notes: Some(format!("Transfer at {}", x.name.as_deref().unwrap_or(&x.stop_id))),
                        });
                    }
                }
            }
        }

        out.sort_by_key(|i| i.duration_sec);
        dedup_by_key(out, |it| {
            (
                it.transfers,
                it.legs[1].route.clone(),
                it.legs[2].route.clone(),
                it.depart_time.clone(),
            )
        })
        .into_iter()
        .take(MAX_ITINERARIES)
        .collect()
    }

    fn build_transit_leg(&self, o: &Stop, d: &Stop, trip: &DirectTrip) -> Leg {
        let route_name = self
            .index
            .routes
            .get(&trip.route_id)
            .map(|r| r.display_name())
            .unwrap_or_else(|| trip.route_id.clone());

        Leg {
            mode: LegMode::Transit,
            from_name: format!("{} ({route_name})", stop_label(o)),
            to_name: format!("{} ({route_name})", stop_label(d)),
            from_lat: o.lat,
            from_lng: o.lng,
            to_lat: d.lat,
            to_lng: d.lng,
            route: Some(route_name),
            trip_id: Some(trip.trip_id.clone()),
            dep_time: Some(format_hhmm(trip.dep)),
            arr_time: Some(format_hhmm(trip.arr)),
            duration_sec: (trip.arr - trip.dep).max(0),
            geometry: None,
            steps: None,
            safety_score: None,
            walk_summary: None,
            alt_options: None,
        }
    }

    async fn enhance_walk_legs(&self, itineraries: &mut [Itinerary], walk_alternatives: usize, safety: SafetyMode) {
        let Some(provider) = &self.walk_provider else { return };

        for it in itineraries.iter_mut() {
            for leg in it.legs.iter_mut() {
                if leg.mode != LegMode::Walk {
                    continue;
                }
                let from = leg.coords_from();
                let to = leg.coords_to();
                let Some(routes) = provider.directions(from, to, walk_alternatives).await else { continue };
                if routes.is_empty() {
                    continue;
                }

                let mut scored: Vec<(WalkRoute, f64, i64)> = Vec::with_capacity(routes.len());
                for route in routes {
                    let safety_score = self.safety.score_route(&route, from, to).await;
                    let biased = if safety.biases() {
                        (route.duration_sec as f64 * safety.bias_factor(safety_score)).round() as i64
                    } else {
                        route.duration_sec
                    };
                    scored.push((route, safety_score, biased));
                }

                let best_idx = scored
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, (_, _, biased))| *biased)
                    .map(|(i, _)| i)
                    .unwrap_or(0);

                let mut alt_options = Vec::new();
                for (idx, (route, safety_score, _)) in scored.iter().enumerate() {
                    if idx == best_idx {
                        continue;
                    }
                    if alt_options.len() >= walk_alternatives {
                        continue;
                    }
                    alt_options.push(WalkAltOption {
                        geometry: route.geometry.clone(),
                        steps: route.steps.clone(),
                        duration_sec: route.duration_sec,
                        safety_score: Some(*safety_score),
                        summary: route.summary.clone(),
                    });
                }

                let (chosen, chosen_safety, _) = scored.swap_remove(best_idx);
                leg.geometry = Some(chosen.geometry);
                leg.steps = Some(chosen.steps);
                leg.duration_sec = chosen.duration_sec;
                leg.safety_score = Some(chosen_safety);
                leg.walk_summary = chosen.summary;
                leg.alt_options = if alt_options.is_empty() { None } else { Some(alt_options) };
            }
        }
    }

    async fn annotate_safety(&self, itineraries: &mut [Itinerary], safety: SafetyMode) {
        for it in itineraries.iter_mut() {
            for leg in it.legs.iter_mut() {
                if leg.mode != LegMode::Walk {
                    continue;
                }
                if leg.safety_score.is_none() {
                    let from = leg.coords_from();
                    let to = leg.coords_to();
                    leg.safety_score = Some(self.safety.score_straight_line(from, to).await);
                }
                if safety.biases() {
                    if let Some(score) = leg.safety_score {
                        leg.duration_sec = (leg.duration_sec as f64 * safety.bias_factor(score)).round() as i64;
                    }
                }
            }
        }
    }

    fn sort_itineraries(&self, itineraries: &mut [Itinerary], safety: SafetyMode) {
        if safety.biases() {
            itineraries.sort_by(|a, b| {
                a.duration_sec
                    .cmp(&b.duration_sec)
                    .then_with(|| b.avg_walk_safety().partial_cmp(&a.avg_walk_safety()).unwrap_or(Ordering::Equal))
            });
        } else {
            itineraries.sort_by_key(|i| i.duration_sec);
        }
    }

    async fn walk_only_fallback(
        &self,
        origin: (f64, f64),
        destination: (f64, f64),
        depart_after: i64,
        req: &PlanRequest,
        reject_walk_below: Option<f64>,
    ) -> Result<Vec<Itinerary>, AppError> {
        if !req.allow_walk_only {
            return Err(AppError::NotFound("no itinerary found within walking radius / schedule window".into()));
        }

        let straight_m = haversine_m(origin.0, origin.1, destination.0, destination.1);
        if straight_m > req.walk_only_max_m {
            return Err(AppError::NotFound("no itinerary found within walking radius / schedule window".into()));
        }

        let mut leg = Leg::walk("Origin", origin, "Destination", destination);

        if let Some(provider) = &self.walk_provider {
            let alt_count = if req.enhance_walk { req.walk_alternatives } else { 0 };
            if let Some(routes) = provider.directions(origin, destination, alt_count).await {
                if !routes.is_empty() {
                    let mut scored = Vec::with_capacity(routes.len());
                    for route in routes {
                        let safety_score = self.safety.score_route(&route, origin, destination).await;
                        let biased = if req.safety.biases() {
                            (route.duration_sec as f64 * req.safety.bias_factor(safety_score)).round() as i64
                        } else {
                            route.duration_sec
                        };
                        scored.push((route, safety_score, biased));
                    }
                    let best_idx = scored
                        .iter()
                        .enumerate()
                        .min_by_key(|(_, (_, _, biased))| *biased)
                        .map(|(i, _)| i)
                        .unwrap_or(0);
                    let (chosen, chosen_safety, _) = scored.swap_remove(best_idx);
                    leg.geometry = Some(chosen.geometry);
                    leg.steps = Some(chosen.steps);
                    leg.duration_sec = chosen.duration_sec;
                    leg.safety_score = Some(chosen_safety);
                    leg.walk_summary = chosen.summary;
                }
            }
        }

        if leg.safety_score.is_none() {
            leg.safety_score = Some(self.safety.score_straight_line(origin, destination).await);
        }
        if req.safety.biases() {
            if let Some(score) = leg.safety_score {
                leg.duration_sec = (leg.duration_sec as f64 * req.safety.bias_factor(score)).round() as i64;
            }
        }

        if let Some(threshold) = reject_walk_below {
            if let Some(score) = leg.safety_score {
                if score < threshold {
                    return Err(AppError::NotFound(format!(
                        "walk-only option rejected by safety filter (threshold={threshold})"
                    )));
                }
            }
        }

        let duration_sec = leg.duration_sec;
        let itinerary = Itinerary {
            duration_sec,
            depart_time: format_hhmm(depart_after),
            arrive_time: format_hhmm(depart_after + duration_sec),
            transfers: 0,
            legs: vec![leg],
            notes: Some("Walk-only fallback".to_string()),
        };

        Ok(vec![itinerary])
    }
}

fn stop_label(stop: &Stop) -> &str {
    stop.name.as_deref().unwrap_or(&stop.stop_id)
}

fn format_hhmm(seconds: i64) -> String {
    let s = seconds.max(0);
    format!("{:02}:{:02}", s / 3600, (s % 3600) / 60)
}

fn seconds_since_local_midnight() -> i64 {
    let now = chrono::Local::now().time();
    now.num_seconds_from_midnight() as i64
}

fn dedup_by_key<T, K: Eq + std::hash::Hash>(items: Vec<T>, key_fn: impl Fn(&T) -> K) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let key = key_fn(&item);
        if seen.insert(key) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Route, Stop, StopTime, Trip};
    use crate::realtime::DelayCache;
    use crate::safety::SafetyOverlay;
    use std::collections::HashMap;

    fn sample_index() -> Arc<GtfsIndex> {
        let mut stops = HashMap::new();
        stops.insert("A".to_string(), Stop { stop_id: "A".into(), name: Some("Stop A".into()), lat: 47.65, lng: -122.31 });
        stops.insert("B".to_string(), Stop { stop_id: "B".into(), name: Some("Stop B".into()), lat: 47.66, lng: -122.30 });

        let mut routes = HashMap::new();
        routes.insert("R".to_string(), Route { route_id: "R".into(), short_name: Some("R1".into()), long_name: None, route_type: None });

        let mut trips = HashMap::new();
        trips.insert("T1".to_string(), Trip { trip_id: "T1".into(), route_id: "R".into(), service_id: "wk".into(), shape_id: None });

        let mut stop_times = HashMap::new();
        stop_times.insert(
            "T1".to_string(),
            vec![
                StopTime { trip_id: "T1".into(), stop_id: "A".into(), stop_sequence: 1, arrival_sec: 32400, departure_sec: 32400 },
                StopTime { trip_id: "T1".into(), stop_id: "B".into(), stop_sequence: 2, arrival_sec: 32640, departure_sec: 32640 },
            ],
        );

        Arc::new(GtfsIndex::build(stops, routes, trips, stop_times))
    }

    async fn sample_planner() -> Planner {
        let index = sample_index();
        let delays = Arc::new(DelayCache::new(None));
        let safety = Arc::new(SafetyOverlay::load(None, None).await);
        Planner::new(index, delays, safety, None, 800.0)
    }

    #[tokio::test]
    async fn direct_plan_produces_three_legs_with_no_transfers() {
        let planner = sample_planner().await;
        let req = PlanRequest {
            origin_lat: 47.65,
            origin_lng: -122.31,
            destination_lat: 47.66,
            destination_lng: -122.30,
            depart_after_sec: Some(32000),
            max_transfers: 0,
            max_walk_m: Some(800.0),
            use_realtime: true,
            enhance_walk: false,
            walk_alternatives: 0,
            safety: SafetyMode::Off,
            reject_walk_below: None,
            allow_walk_only: true,
            walk_only_max_m: 5000.0,
        };

        let itineraries = planner.plan(&req).await.unwrap();
        assert!(!itineraries.is_empty());
        let it = &itineraries[0];
        assert_eq!(it.legs.len(), 3);
        assert_eq!(it.transfers, 0);
        assert_eq!(it.legs[1].mode, LegMode::Transit);
        assert_eq!(it.duration_sec, it.legs.iter().map(|l| l.duration_sec).sum::<i64>());
    }

    #[tokio::test]
    async fn unreachable_destination_without_walk_only_is_not_found() {
        let planner = sample_planner().await;
        let req = PlanRequest {
            origin_lat: 10.0,
            origin_lng: 10.0,
            destination_lat: 20.0,
            destination_lng: 20.0,
            depart_after_sec: Some(0),
            max_transfers: 0,
            max_walk_m: Some(100.0),
            use_realtime: true,
            enhance_walk: false,
            walk_alternatives: 0,
            safety: SafetyMode::Off,
            reject_walk_below: None,
            allow_walk_only: false,
            walk_only_max_m: 5000.0,
        };

        let err = planner.plan(&req).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn safety_bias_factor_matches_spec_constants() {
        assert_eq!(SafetyMode::Prefer.bias_factor(0.0), 1.3);
        assert_eq!(SafetyMode::Strict.bias_factor(0.0), 1.6);
        assert_eq!(SafetyMode::Off.bias_factor(0.0), 1.0);
    }

    #[test]
    fn dedup_by_key_keeps_first_occurrence() {
        let items = vec![(1, "a"), (1, "b"), (2, "c")];
        let out = dedup_by_key(items, |(k, _)| *k);
        assert_eq!(out, vec![(1, "a"), (2, "c")]);
    }
}
