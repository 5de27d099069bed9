//! ETA estimator: fuses crowd reports and the realtime delay cache into a
//! single arrival estimate per stop, falling back to a flat headway when
//! neither source has anything to say.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::gtfs::GtfsIndex;
use crate::realtime::DelayCache;
use crate::reports::{weighted_avg, ReportStore};

const DEFAULT_HEADWAY_SECS: i64 = 600;
/// Walking speed used for the optional door-to-door extension, matching the
/// walking speed assumed elsewhere in the planner.
const WALK_SPEED_MPS: f64 = 5_000.0 / 3600.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EtaSource {
    Crowd,
    LiveFeed,
    CrowdLive,
    Schedule,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EtaResult {
    pub stop_id: String,
    pub line_id: Option<String>,
    pub eta_seconds: i64,
    pub source: EtaSource,
    pub details: Value,
}

pub struct Estimator {
    index: Arc<GtfsIndex>,
    delays: Arc<DelayCache>,
    reports: Arc<dyn ReportStore>,
    report_decay_secs: i64,
}

impl Estimator {
    pub fn new(
        index: Arc<GtfsIndex>,
        delays: Arc<DelayCache>,
        reports: Arc<dyn ReportStore>,
        report_decay_secs: i64,
    ) -> Self {
        Self { index, delays, reports, report_decay_secs }
    }

    pub async fn eta(
        &self,
        stop_id: &str,
        line_id: Option<&str>,
        origin: Option<(f64, f64)>,
    ) -> Result<EtaResult, AppError> {
        let stop = self
            .index
            .stops
            .get(stop_id)
            .ok_or_else(|| AppError::NotFound(format!("unknown stop {stop_id}")))?;

        let now = Utc::now();
        let window_start = now - chrono::Duration::seconds(self.report_decay_secs * 2);

        let reports = self.reports.query(stop_id, line_id, window_start).await;
        let crowd_count = reports.len();
        let weighted_input: Vec<(i64, i64)> = reports
            .iter()
            .map(|r| (r.arrival_seconds, (now - r.timestamp).num_seconds().max(0)))
            .collect();
        let crowd_eta = weighted_avg(&weighted_input, self.report_decay_secs).map(|v| v.round() as i64);

        let live_eta = self.next_live_arrival(stop_id, line_id).await;

        let mut details = Map::new();
        details.insert("crowd_count".into(), json!(crowd_count));

        let (eta_seconds, source) = match (crowd_eta, live_eta) {
            (Some(crowd), Some(live)) => {
                details.insert("crowd_eta".into(), json!(crowd));
                details.insert("live_eta".into(), json!(live));
                (((0.4 * crowd as f64) + (0.6 * live as f64)).round() as i64, EtaSource::CrowdLive)
            }
            (Some(crowd), None) => {
                details.insert("crowd_eta".into(), json!(crowd));
                (crowd, EtaSource::Crowd)
            }
            (None, Some(live)) => {
                details.insert("live_eta".into(), json!(live));
                (live, EtaSource::LiveFeed)
            }
            (None, None) => {
                let epoch = now.timestamp();
                let next_multiple = ((epoch / DEFAULT_HEADWAY_SECS) + 1) * DEFAULT_HEADWAY_SECS;
                details.insert("assumed_headway".into(), json!(DEFAULT_HEADWAY_SECS));
                ((next_multiple - epoch).max(0), EtaSource::Schedule)
            }
        };

        let mut eta_seconds = eta_seconds.max(0);

        if let Some((lat, lng)) = origin {
            let distance_m = crate::walk::haversine_m(lat, lng, stop.lat, stop.lng);
            let walk_seconds = (distance_m / WALK_SPEED_MPS).round() as i64;
            details.insert("origin_distance_m".into(), json!(distance_m.round()));
            details.insert("walk_seconds".into(), json!(walk_seconds));
            eta_seconds += walk_seconds;
        }

        Ok(EtaResult {
            stop_id: stop_id.to_string(),
            line_id: line_id.map(str::to_string),
            eta_seconds,
            source,
            details: Value::Object(details),
        })
    }

    /// Earliest upcoming arrival at `stop_id`, adjusted by the realtime
    /// delay cache, at least 2 minutes in the past being acceptable slack
    /// for a vehicle that is already arriving.
    ///
    /// GTFS schedule times are seconds since midnight of the feed's local
    /// service day, so the reference point here must be local wall-clock
    /// time (matching `planner::seconds_since_local_midnight`), not UTC.
    async fn next_live_arrival(&self, stop_id: &str, line_id: Option<&str>) -> Option<i64> {
        let stop_times = self.index.stop_times_by_stop.get(stop_id)?;
        if stop_times.is_empty() {
            return None;
        }

        let snapshot = self.delays.snapshot().await;
        let seconds_since_midnight = seconds_since_local_midnight();

        let mut best: Option<i64> = None;
        for st in stop_times {
            if let Some(line_id) = line_id {
                let trip_route = self.index.trips.get(&st.trip_id).map(|t| t.route_id.as_str());
                if trip_route != Some(line_id) {
                    continue;
                }
            }

            let adjusted = st.arrival_sec as i64 + snapshot.adjustment(&st.trip_id, stop_id) as i64;
            let eta = adjusted - seconds_since_midnight;
            if eta >= -120 {
                best = Some(best.map_or(eta, |b| b.min(eta)));
            }
        }
        best.map(|eta| eta.max(0))
    }
}

fn seconds_since_local_midnight() -> i64 {
    chrono::Local::now().time().num_seconds_from_midnight() as i64
}

use chrono::Timelike;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Route, Stop, StopTime, Trip};
    use crate::reports::{CrowdReportIn, InMemoryReportStore};
    use std::collections::HashMap;

    fn index_with_stop(stop_id: &str) -> Arc<GtfsIndex> {
        let mut stops = HashMap::new();
        stops.insert(stop_id.to_string(), Stop { stop_id: stop_id.to_string(), name: None, lat: 47.65, lng: -122.31 });
        Arc::new(GtfsIndex::build(stops, HashMap::new(), HashMap::new(), HashMap::new()))
    }

    #[tokio::test]
    async fn falls_back_to_schedule_headway_when_no_sources() {
        let index = index_with_stop("S1");
        let delays = Arc::new(DelayCache::new(None));
        let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
        let estimator = Estimator::new(index, delays, reports, 600);

        let result = estimator.eta("S1", None, None).await.unwrap();
        assert_eq!(result.source, EtaSource::Schedule);
        assert!(result.eta_seconds >= 0 && result.eta_seconds <= 600);
        assert_eq!(result.details["assumed_headway"], json!(600));
    }

    #[tokio::test]
    async fn unknown_stop_is_not_found() {
        let index = index_with_stop("S1");
        let delays = Arc::new(DelayCache::new(None));
        let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
        let estimator = Estimator::new(index, delays, reports, 600);

        let err = estimator.eta("unknown", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn crowd_only_reports_weighted_mean() {
        let index = index_with_stop("S1");
        let delays = Arc::new(DelayCache::new(None));
        let store = InMemoryReportStore::new();
        store.append(CrowdReportIn { stop_id: "S1".into(), line_id: None, arrival_seconds: 240, mode: None }).await;
        let reports: Arc<dyn ReportStore> = Arc::new(store);
        let estimator = Estimator::new(index, delays, reports, 600);

        let result = estimator.eta("S1", None, None).await.unwrap();
        assert_eq!(result.source, EtaSource::Crowd);
        assert_eq!(result.details["crowd_count"], json!(1));
    }

}
