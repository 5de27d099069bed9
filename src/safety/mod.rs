//! Safety overlay: loads a per-road danger map and a set of circular safety
//! zones, and scores walking legs against them. Both files are optional —
//! a missing file degrades to an empty map/zone set rather than failing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::gtfs::GtfsError;
use crate::walk::{haversine_m, WalkRoute};

/// `{"roads": {name -> 1..10}, "types": {tag -> 1..10}, "default": 1..10}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DangerMap {
    #[serde(default)]
    roads: HashMap<String, u8>,
    #[serde(default)]
    types: HashMap<String, u8>,
    #[serde(default = "default_danger")]
    default: u8,
}

fn default_danger() -> u8 {
    5
}

impl Default for DangerMap {
    fn default() -> Self {
        Self {
            roads: HashMap::new(),
            types: HashMap::new(),
            default: default_danger(),
        }
    }
}

impl DangerMap {
    fn normalize(mut self) -> Self {
        self.roads = self
            .roads
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.clamp(1, 10)))
            .collect();
        self.types = self
            .types
            .into_iter()
            .map(|(k, v)| (k.trim().to_lowercase(), v.clamp(1, 10)))
            .collect();
        self.default = self.default.clamp(1, 10);
        self
    }

    fn danger_for(&self, step_name: &str) -> u8 {
        let key = step_name.trim().to_lowercase();
        if let Some(d) = self.roads.get(&key) {
            return *d;
        }
        if let Some(tag) = infer_road_type(&key) {
            if let Some(d) = self.types.get(tag) {
                return *d;
            }
        }
        self.default
    }
}

/// Danger score 1..10 -> safety score 1.0..0.0, rounded to 3 decimals.
fn danger_to_safety(danger: u8) -> f64 {
    let danger = danger.clamp(1, 10) as f64;
    ((1.0 - (danger - 1.0) / 9.0) * 1000.0).round() / 1000.0
}

fn infer_road_type(lower_name: &str) -> Option<&'static str> {
    if lower_name.contains("alley") {
        return Some("alley");
    }
    if lower_name.contains("trail") || lower_name.contains("path") || lower_name.contains("walk") {
        return Some("trail");
    }
    if lower_name.contains("way") {
        return Some("arterial");
    }
    if lower_name.contains("ave")
        || lower_name.contains("avenue")
        || lower_name.contains("st ")
        || lower_name.contains("street")
        || lower_name.contains("blvd")
    {
        return Some("street");
    }
    None
}

/// A circular region with an associated safety score (higher is safer).
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SafetyZone {
    #[serde(rename = "type", default = "zone_type_circle")]
    pub zone_type: String,
    pub lat: f64,
    pub lng: f64,
    pub radius_m: f64,
    pub score: f64,
    #[serde(default)]
    pub label: Option<String>,
}

fn zone_type_circle() -> String {
    "circle".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SafetyZonesFile {
    #[serde(default)]
    zones: Vec<SafetyZone>,
}

fn normalize_zones(file: SafetyZonesFile) -> Vec<SafetyZone> {
    file.zones
        .into_iter()
        .filter(|z| z.zone_type.eq_ignore_ascii_case("circle"))
        .filter(|z| z.radius_m > 0.0)
        .map(|mut z| {
            z.score = z.score.clamp(0.0, 1.0);
            z
        })
        .collect()
}

/// Loads, holds, and scores the two safety data sources. Both are
/// swappable behind a `RwLock` so `reload()` is atomic from a reader's
/// perspective.
pub struct SafetyOverlay {
    danger_map_path: Option<PathBuf>,
    safety_zones_path: Option<PathBuf>,
    danger_map: RwLock<DangerMap>,
    zones: RwLock<Vec<SafetyZone>>,
}

impl SafetyOverlay {
    /// Load both files at startup. A missing or unreadable file degrades to
    /// an empty map/zone set; it never aborts startup.
    pub async fn load(danger_map_path: Option<String>, safety_zones_path: Option<String>) -> Self {
        let danger_map_path = danger_map_path.map(PathBuf::from);
        let safety_zones_path = safety_zones_path.map(PathBuf::from);

        let danger_map = match &danger_map_path {
            Some(p) => load_danger_map(p).await.unwrap_or_else(|e| {
                warn!(error = %e, path = %p.display(), "Failed to load danger map, using empty map");
                DangerMap::default()
            }),
            None => DangerMap::default(),
        };

        let zones = match &safety_zones_path {
            Some(p) => load_safety_zones(p).await.unwrap_or_else(|e| {
                warn!(error = %e, path = %p.display(), "Failed to load safety zones, using empty set");
                Vec::new()
            }),
            None => Vec::new(),
        };

        info!(
            roads = danger_map.roads.len(),
            types = danger_map.types.len(),
            zones = zones.len(),
            "Loaded safety overlay"
        );

        Self {
            danger_map_path,
            safety_zones_path,
            danger_map: RwLock::new(danger_map),
            zones: RwLock::new(zones),
        }
    }

    /// Re-read the danger map file from disk, swapping it in atomically.
    pub async fn reload_danger_map(&self) -> Result<(), GtfsError> {
        let Some(path) = &self.danger_map_path else {
            return Ok(());
        };
        let map = load_danger_map(path).await?;
        *self.danger_map.write().await = map;
        Ok(())
    }

    /// Re-read the safety zones file from disk, swapping it in atomically.
    pub async fn reload_zones(&self) -> Result<(), GtfsError> {
        let Some(path) = &self.safety_zones_path else {
            return Ok(());
        };
        let zones = load_safety_zones(path).await?;
        *self.zones.write().await = zones;
        Ok(())
    }

    /// Score a walking route against both data sources and combine them:
    /// the arithmetic mean of whichever components are defined, or the
    /// default-only road score if neither walking steps nor geometry
    /// produced anything.
    pub async fn score_route(&self, route: &WalkRoute, from: (f64, f64), to: (f64, f64)) -> f64 {
        let road_score = self.score_road(&route.steps).await;
        let zone_score = self.score_zones(Some(&route.geometry), from, to).await;
        combine(road_score, zone_score)
    }

    /// Score a plain straight-line walk (no provider route available).
    pub async fn score_straight_line(&self, from: (f64, f64), to: (f64, f64)) -> f64 {
        let road_score = self.score_road(&[]).await;
        let zone_score = self.score_zones(None, from, to).await;
        combine(Some(road_score), zone_score).unwrap_or(road_score)
    }

    async fn score_road(&self, steps: &[crate::walk::WalkStep]) -> f64 {
        let danger_map = self.danger_map.read().await;
        if steps.is_empty() {
            return danger_to_safety(danger_map.default);
        }

        let mut total_dist = 0.0;
        let mut weighted = 0.0;
        let mut scores = Vec::with_capacity(steps.len());
        for step in steps {
            let danger = danger_map.danger_for(&step.name);
            let safety = danger_to_safety(danger);
            scores.push(safety);
            total_dist += step.distance_m;
            weighted += safety * step.distance_m;
        }

        if total_dist > 0.0 {
            round3(weighted / total_dist)
        } else {
            round3(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    async fn score_zones(
        &self,
        geometry: Option<&[[f64; 2]]>,
        from: (f64, f64),
        to: (f64, f64),
    ) -> Option<f64> {
        let zones = self.zones.read().await;
        if zones.is_empty() {
            return None;
        }

        let samples: Vec<(f64, f64)> = match geometry {
            Some(points) if !points.is_empty() => points
                .iter()
                .enumerate()
                .filter(|(i, _)| i % 4 == 0)
                .map(|(_, p)| (p[1], p[0]))
                .collect(),
            _ => {
                let mid = ((from.0 + to.0) / 2.0, (from.1 + to.1) / 2.0);
                vec![from, mid, to]
            }
        };

        let mut values = Vec::new();
        for (lat, lng) in samples {
            if let Some(best) = zone_score_at(&zones, lat, lng) {
                values.push(best);
            }
        }

        if values.is_empty() {
            None
        } else {
            Some(round3(values.iter().sum::<f64>() / values.len() as f64))
        }
    }
}

fn zone_score_at(zones: &[SafetyZone], lat: f64, lng: f64) -> Option<f64> {
    zones
        .iter()
        .filter(|z| haversine_m(lat, lng, z.lat, z.lng) <= z.radius_m)
        .map(|z| z.score)
        .fold(None, |acc, s| Some(acc.map_or(s, |a: f64| a.max(s))))
}

fn combine(road: Option<f64>, zone: Option<f64>) -> Option<f64> {
    match (road, zone) {
        (Some(r), Some(z)) => Some(round3((r + z) / 2.0)),
        (Some(r), None) => Some(r),
        (None, Some(z)) => Some(z),
        (None, None) => None,
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

async fn load_danger_map(path: &Path) -> Result<DangerMap, GtfsError> {
    let bytes = tokio::fs::read(path).await?;
    let map: DangerMap = serde_json::from_slice(&bytes)?;
    Ok(map.normalize())
}

async fn load_safety_zones(path: &Path) -> Result<Vec<SafetyZone>, GtfsError> {
    let bytes = tokio::fs::read(path).await?;
    let file: SafetyZonesFile = serde_json::from_slice(&bytes)?;
    Ok(normalize_zones(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walk::WalkStep;

    fn danger_map(roads: &[(&str, u8)], types: &[(&str, u8)], default: u8) -> DangerMap {
        DangerMap {
            roads: roads.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            types: types.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            default,
        }
        .normalize()
    }

    #[test]
    fn danger_to_safety_extremes() {
        assert_eq!(danger_to_safety(1), 1.0);
        assert_eq!(danger_to_safety(10), 0.0);
    }

    #[test]
    fn danger_for_prefers_exact_road_name_over_inferred_type() {
        let map = danger_map(&[("memorial way ne", 3)], &[("arterial", 9)], 5);
        assert_eq!(map.danger_for("Memorial Way NE"), 3);
        assert_eq!(map.danger_for("Some Other Way"), 9);
        assert_eq!(map.danger_for("Unrelated Place"), 5);
    }

    #[test]
    fn infer_road_type_matches_expected_tags() {
        assert_eq!(infer_road_type("shadowy alley"), Some("alley"));
        assert_eq!(infer_road_type("burke gilman trail"), Some("trail"));
        assert_eq!(infer_road_type("memorial way"), Some("arterial"));
        assert_eq!(infer_road_type("15th ave ne"), Some("street"));
        assert_eq!(infer_road_type("unnamed"), None);
    }

    #[tokio::test]
    async fn score_road_is_distance_weighted() {
        let overlay = SafetyOverlay {
            danger_map_path: None,
            safety_zones_path: None,
            danger_map: RwLock::new(danger_map(&[("safe st", 1), ("risky alley", 10)], &[], 5)),
            zones: RwLock::new(Vec::new()),
        };
        let steps = vec![
            WalkStep { name: "Safe St".into(), distance_m: 100.0, duration_s: 60, maneuver: String::new() },
            WalkStep { name: "Risky Alley".into(), distance_m: 900.0, duration_s: 600, maneuver: String::new() },
        ];
        let score = overlay.score_road(&steps).await;
        // weighted: (1.0*100 + 0.0*900) / 1000 = 0.1
        assert!((score - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn score_road_falls_back_to_arithmetic_mean_when_distances_are_zero() {
        let overlay = SafetyOverlay {
            danger_map_path: None,
            safety_zones_path: None,
            danger_map: RwLock::new(danger_map(&[("a", 1), ("b", 10)], &[], 5)),
            zones: RwLock::new(Vec::new()),
        };
        let steps = vec![
            WalkStep { name: "a".into(), distance_m: 0.0, duration_s: 0, maneuver: String::new() },
            WalkStep { name: "b".into(), distance_m: 0.0, duration_s: 0, maneuver: String::new() },
        ];
        let score = overlay.score_road(&steps).await;
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn score_zones_is_none_when_no_sample_is_covered() {
        let overlay = SafetyOverlay {
            danger_map_path: None,
            safety_zones_path: None,
            danger_map: RwLock::new(DangerMap::default()),
            zones: RwLock::new(vec![SafetyZone {
                zone_type: "circle".into(),
                lat: 10.0,
                lng: 10.0,
                radius_m: 50.0,
                score: 0.9,
                label: None,
            }]),
        };
        let score = overlay.score_zones(None, (0.0, 0.0), (0.1, 0.1)).await;
        assert_eq!(score, None);
    }

    #[tokio::test]
    async fn score_zones_takes_max_covering_score_per_sample() {
        let overlay = SafetyOverlay {
            danger_map_path: None,
            safety_zones_path: None,
            danger_map: RwLock::new(DangerMap::default()),
            zones: RwLock::new(vec![
                SafetyZone { zone_type: "circle".into(), lat: 0.0, lng: 0.0, radius_m: 500.0, score: 0.2, label: None },
                SafetyZone { zone_type: "circle".into(), lat: 0.0, lng: 0.0, radius_m: 500.0, score: 0.8, label: None },
            ]),
        };
        let score = overlay.score_zones(None, (0.0, 0.0), (0.0, 0.0)).await;
        assert_eq!(score, Some(0.8));
    }

    #[test]
    fn normalize_zones_drops_non_circle_and_non_positive_radius() {
        let file = SafetyZonesFile {
            zones: vec![
                SafetyZone { zone_type: "polygon".into(), lat: 0.0, lng: 0.0, radius_m: 10.0, score: 0.5, label: None },
                SafetyZone { zone_type: "circle".into(), lat: 0.0, lng: 0.0, radius_m: 0.0, score: 0.5, label: None },
                SafetyZone { zone_type: "circle".into(), lat: 0.0, lng: 0.0, radius_m: 10.0, score: 1.5, label: None },
            ],
        };
        let zones = normalize_zones(file);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].score, 1.0);
    }
}
