//! Static GTFS index: loads `stops.txt`, `routes.txt`, `trips.txt`, and
//! `stop_times.txt` from a directory into in-memory relations, and builds
//! the derived indexes the planner and ETA estimator query against.

pub mod error;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::info;

use crate::model::{Route, Stop, StopTime, Trip};

pub use error::GtfsError;

/// The fully loaded, immutable static schedule.
///
/// Built once at startup (or on an explicit reload) and then shared behind
/// an `Arc` — nothing here mutates afterwards.
pub struct GtfsIndex {
    pub stops: HashMap<String, Stop>,
    pub routes: HashMap<String, Route>,
    pub trips: HashMap<String, Trip>,
    /// trip_id -> stop times ordered by stop_sequence
    pub stop_times_by_trip: HashMap<String, Vec<StopTime>>,
    /// stop_id -> stop times ordered by arrival_sec
    pub stop_times_by_stop: HashMap<String, Vec<StopTime>>,
    /// stop_id -> routes serving it
    pub routes_by_stop: HashMap<String, HashSet<String>>,
    /// route_id -> trip_ids on that route
    pub trips_by_route: HashMap<String, Vec<String>>,
}

impl GtfsIndex {
    /// Load the four required feed files from `dir`. A missing `stops.txt`
    /// is treated as fatal; other structural problems in individual files
    /// abort the load with a `ParseError`.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, GtfsError> {
        let dir = dir.as_ref();

        let stops = parse_stops(&dir.join("stops.txt"))?;
        info!(count = stops.len(), "Loaded GTFS stops");

        let routes = parse_routes(&dir.join("routes.txt"))?;
        info!(count = routes.len(), "Loaded GTFS routes");

        let trips = parse_trips(&dir.join("trips.txt"))?;
        info!(count = trips.len(), "Loaded GTFS trips");

        let stop_times = parse_stop_times(&dir.join("stop_times.txt"))?;
        let total_st: usize = stop_times.values().map(|v| v.len()).sum();
        info!(trips_with_times = stop_times.len(), total_stop_times = total_st, "Loaded GTFS stop_times");

        Ok(Self::build(stops, routes, trips, stop_times))
    }

    /// Assemble an index from already-parsed entities, building the derived
    /// relations. Split out from `load_from_dir` so tests can construct a
    /// small index directly.
    pub fn build(
        stops: HashMap<String, Stop>,
        routes: HashMap<String, Route>,
        trips: HashMap<String, Trip>,
        mut stop_times_by_trip: HashMap<String, Vec<StopTime>>,
    ) -> Self {
        for sts in stop_times_by_trip.values_mut() {
            sts.sort_by_key(|st| st.stop_sequence);
        }

        let mut stop_times_by_stop: HashMap<String, Vec<StopTime>> = HashMap::new();
        let mut routes_by_stop: HashMap<String, HashSet<String>> = HashMap::new();
        let mut trips_by_route: HashMap<String, Vec<String>> = HashMap::new();

        for (trip_id, sts) in &stop_times_by_trip {
            let route_id = trips.get(trip_id).map(|t| t.route_id.clone());
            if let Some(route_id) = &route_id {
                trips_by_route.entry(route_id.clone()).or_default().push(trip_id.clone());
            }
            for st in sts {
                stop_times_by_stop.entry(st.stop_id.clone()).or_default().push(st.clone());
                if let Some(route_id) = &route_id {
                    routes_by_stop.entry(st.stop_id.clone()).or_default().insert(route_id.clone());
                }
            }
        }

        for sts in stop_times_by_stop.values_mut() {
            sts.sort_by_key(|st| st.arrival_sec);
        }

        Self {
            stops,
            routes,
            trips,
            stop_times_by_trip,
            stop_times_by_stop,
            routes_by_stop,
            trips_by_route,
        }
    }

    /// Stop ids ordered by served-route count, descending — candidate
    /// interchanges for one-transfer planning.
    pub fn busiest_stops(&self, limit: usize) -> Vec<String> {
        let mut stops: Vec<&String> = self.routes_by_stop.keys().collect();
        stops.sort_by_key(|s| std::cmp::Reverse(self.routes_by_stop[*s].len()));
        stops.into_iter().take(limit).cloned().collect()
    }
}

/// Parse a GTFS time string `HH:MM:SS` to seconds since midnight. Hours may
/// exceed 24 to denote service continuing into the next day.
pub fn parse_gtfs_time(s: &str) -> Option<i32> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: i32 = parts[0].parse().ok()?;
    let minutes: i32 = parts[1].parse().ok()?;
    let seconds: i32 = parts[2].parse().ok()?;
    Some(hours * 3600 + minutes * 60 + seconds)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn header_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn require_header(headers: &csv::StringRecord, name: &str, file: &str) -> Result<usize, GtfsError> {
    header_index(headers, name).ok_or_else(|| GtfsError::ParseError(format!("{file} missing {name}")))
}

/// 1-based data row number (header line excluded), for error messages.
fn row_number(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.record()).unwrap_or(0)
}

fn parse_stops(path: &Path) -> Result<HashMap<String, Stop>, GtfsError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_id = require_header(&headers, "stop_id", "stops.txt")?;
    let idx_name = header_index(&headers, "stop_name");
    let idx_lat = require_header(&headers, "stop_lat", "stops.txt")?;
    let idx_lon = require_header(&headers, "stop_lon", "stops.txt")?;

    let mut stops = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let stop_id = record.get(idx_id).unwrap_or("").to_string();
        if stop_id.is_empty() {
            return Err(GtfsError::ParseError(format!(
                "stops.txt row {}: empty stop_id",
                row_number(&record)
            )));
        }
        let lat = record.get(idx_lat).and_then(|s| s.parse::<f64>().ok());
        let lng = record.get(idx_lon).and_then(|s| s.parse::<f64>().ok());
        let (Some(lat), Some(lng)) = (lat, lng) else {
            return Err(GtfsError::ParseError(format!(
                "stops.txt row {}: stop {stop_id} has a missing or non-finite stop_lat/stop_lon",
                row_number(&record)
            )));
        };
        if !lat.is_finite() || !lng.is_finite() {
            return Err(GtfsError::ParseError(format!(
                "stops.txt row {}: stop {stop_id} has a non-finite coordinate",
                row_number(&record)
            )));
        }
        stops.insert(
            stop_id.clone(),
            Stop {
                stop_id,
                name: idx_name.and_then(|i| record.get(i)).and_then(non_empty),
                lat,
                lng,
            },
        );
    }
    Ok(stops)
}

fn parse_routes(path: &Path) -> Result<HashMap<String, Route>, GtfsError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_id = require_header(&headers, "route_id", "routes.txt")?;
    let idx_short = header_index(&headers, "route_short_name");
    let idx_long = header_index(&headers, "route_long_name");
    let idx_type = header_index(&headers, "route_type");

    let mut routes = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let route_id = record.get(idx_id).unwrap_or("").to_string();
        if route_id.is_empty() {
            return Err(GtfsError::ParseError(format!(
                "routes.txt row {}: empty route_id",
                row_number(&record)
            )));
        }
        routes.insert(
            route_id.clone(),
            Route {
                route_id,
                short_name: idx_short.and_then(|i| record.get(i)).and_then(non_empty),
                long_name: idx_long.and_then(|i| record.get(i)).and_then(non_empty),
                route_type: idx_type.and_then(|i| record.get(i)).and_then(|s| s.parse().ok()),
            },
        );
    }
    Ok(routes)
}

fn parse_trips(path: &Path) -> Result<HashMap<String, Trip>, GtfsError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_trip = require_header(&headers, "trip_id", "trips.txt")?;
    let idx_route = require_header(&headers, "route_id", "trips.txt")?;
    let idx_service = require_header(&headers, "service_id", "trips.txt")?;
    let idx_shape = header_index(&headers, "shape_id");

    let mut trips = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        let route_id = record.get(idx_route).unwrap_or("").to_string();
        let service_id = record.get(idx_service).unwrap_or("").to_string();
        if trip_id.is_empty() || route_id.is_empty() || service_id.is_empty() {
            return Err(GtfsError::ParseError(format!(
                "trips.txt row {}: empty trip_id, route_id, or service_id",
                row_number(&record)
            )));
        }
        trips.insert(
            trip_id.clone(),
            Trip {
                trip_id,
                route_id,
                service_id,
                shape_id: idx_shape.and_then(|i| record.get(i)).and_then(non_empty),
            },
        );
    }
    Ok(trips)
}

fn parse_stop_times(path: &Path) -> Result<HashMap<String, Vec<StopTime>>, GtfsError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();

    let idx_trip = require_header(&headers, "trip_id", "stop_times.txt")?;
    let idx_stop = require_header(&headers, "stop_id", "stop_times.txt")?;
    let idx_seq = require_header(&headers, "stop_sequence", "stop_times.txt")?;
    let idx_arr = require_header(&headers, "arrival_time", "stop_times.txt")?;
    let idx_dep = require_header(&headers, "departure_time", "stop_times.txt")?;

    let mut stop_times: HashMap<String, Vec<StopTime>> = HashMap::new();
    for result in rdr.records() {
        let record = result?;
        let trip_id = record.get(idx_trip).unwrap_or("").to_string();
        let stop_id = record.get(idx_stop).unwrap_or("").to_string();
        if trip_id.is_empty() || stop_id.is_empty() {
            return Err(GtfsError::ParseError(format!(
                "stop_times.txt row {}: empty trip_id or stop_id",
                row_number(&record)
            )));
        }
        let arrival_sec = record.get(idx_arr).and_then(parse_gtfs_time).ok_or_else(|| {
            GtfsError::ParseError(format!(
                "stop_times.txt row {}: trip {trip_id} stop {stop_id} has an unparseable arrival_time",
                row_number(&record)
            ))
        })?;
        let departure_sec = record.get(idx_dep).and_then(parse_gtfs_time).ok_or_else(|| {
            GtfsError::ParseError(format!(
                "stop_times.txt row {}: trip {trip_id} stop {stop_id} has an unparseable departure_time",
                row_number(&record)
            ))
        })?;
        if arrival_sec > departure_sec {
            return Err(GtfsError::ParseError(format!(
                "stop_times.txt row {}: trip {trip_id} stop {stop_id} has arrival_time after departure_time",
                row_number(&record)
            )));
        }
        let stop_sequence = record.get(idx_seq).and_then(|s| s.parse().ok()).ok_or_else(|| {
            GtfsError::ParseError(format!(
                "stop_times.txt row {}: trip {trip_id} stop {stop_id} has an unparseable stop_sequence",
                row_number(&record)
            ))
        })?;
        stop_times.entry(trip_id.clone()).or_default().push(StopTime {
            trip_id,
            stop_id,
            stop_sequence,
            arrival_sec,
            departure_sec,
        });
    }
    for sts in stop_times.values_mut() {
        sts.sort_by_key(|st| st.stop_sequence);
    }
    Ok(stop_times)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(route_id: &str) -> Trip {
        Trip {
            trip_id: format!("t-{route_id}"),
            route_id: route_id.to_string(),
            service_id: "weekday".to_string(),
            shape_id: None,
        }
    }

    fn stop_time(trip_id: &str, stop_id: &str, seq: i32, arr: i32) -> StopTime {
        StopTime {
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
            stop_sequence: seq,
            arrival_sec: arr,
            departure_sec: arr,
        }
    }

    #[test]
    fn parse_gtfs_time_supports_next_day_hours() {
        assert_eq!(parse_gtfs_time("08:30:00"), Some(30600));
        assert_eq!(parse_gtfs_time("25:30:00"), Some(91800));
        assert_eq!(parse_gtfs_time("invalid"), None);
        assert_eq!(parse_gtfs_time("08:30"), None);
    }

    #[test]
    fn build_derives_indexes_from_stop_times() {
        let mut trips = HashMap::new();
        trips.insert("t-R1".to_string(), trip("R1"));

        let mut stop_times = HashMap::new();
        stop_times.insert(
            "t-R1".to_string(),
            vec![
                stop_time("t-R1", "B", 2, 32640),
                stop_time("t-R1", "A", 1, 32400),
            ],
        );

        let index = GtfsIndex::build(HashMap::new(), HashMap::new(), trips, stop_times);

        let times = &index.stop_times_by_trip["t-R1"];
        assert_eq!(times[0].stop_id, "A");
        assert_eq!(times[1].stop_id, "B");

        assert!(index.routes_by_stop["A"].contains("R1"));
        assert!(index.routes_by_stop["B"].contains("R1"));
        assert_eq!(index.trips_by_route["R1"], vec!["t-R1".to_string()]);
        assert_eq!(index.stop_times_by_stop["A"][0].arrival_sec, 32400);
    }

    fn write_temp_csv(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("transit_eta_gtfs_test_{name}.csv"));
        std::fs::write(&path, contents).expect("write temp csv");
        path
    }

    #[test]
    fn parse_stops_aborts_on_missing_coordinate() {
        let path = write_temp_csv(
            "stops_missing_coord",
            "stop_id,stop_name,stop_lat,stop_lon\nA,Stop A,47.65,\n",
        );
        let err = parse_stops(&path).unwrap_err();
        assert!(matches!(err, GtfsError::ParseError(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn parse_stops_aborts_on_empty_stop_id() {
        let path = write_temp_csv(
            "stops_empty_id",
            "stop_id,stop_name,stop_lat,stop_lon\n,Stop A,47.65,-122.31\n",
        );
        let err = parse_stops(&path).unwrap_err();
        assert!(matches!(err, GtfsError::ParseError(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn parse_stop_times_aborts_on_unparseable_arrival_time() {
        let path = write_temp_csv(
            "stop_times_bad_time",
            "trip_id,stop_id,arrival_time,departure_time,stop_sequence\nT1,A,not-a-time,08:30:00,1\n",
        );
        let err = parse_stop_times(&path).unwrap_err();
        assert!(matches!(err, GtfsError::ParseError(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn parse_stop_times_aborts_when_arrival_after_departure() {
        let path = write_temp_csv(
            "stop_times_arr_after_dep",
            "trip_id,stop_id,arrival_time,departure_time,stop_sequence\nT1,A,08:31:00,08:30:00,1\n",
        );
        let err = parse_stop_times(&path).unwrap_err();
        assert!(matches!(err, GtfsError::ParseError(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn busiest_stops_orders_by_served_route_count() {
        let mut trips = HashMap::new();
        trips.insert("t-R1".to_string(), trip("R1"));
        trips.insert("t-R2".to_string(), trip("R2"));

        let mut stop_times = HashMap::new();
        stop_times.insert("t-R1".to_string(), vec![stop_time("t-R1", "HUB", 1, 100)]);
        stop_times.insert("t-R2".to_string(), vec![stop_time("t-R2", "HUB", 1, 100), stop_time("t-R2", "LEAF", 2, 200)]);

        let index = GtfsIndex::build(HashMap::new(), HashMap::new(), trips, stop_times);
        let busiest = index.busiest_stops(1);
        assert_eq!(busiest, vec!["HUB".to_string()]);
    }
}
