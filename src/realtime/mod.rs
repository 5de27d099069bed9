//! Realtime delay cache: polls a GTFS-Realtime TripUpdates feed in the
//! background and keeps an atomically-swapped snapshot of per-trip and
//! per-(trip, stop) delays for the planner and ETA estimator to read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use prost::Message;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gtfs::GtfsError;

/// A paired snapshot of trip- and stop-level delays. Kept behind a single
/// lock so readers never observe one half updated without the other.
#[derive(Debug, Clone, Default)]
pub struct DelaySnapshot {
    pub trip_delay: HashMap<String, i32>,
    pub stop_delay: HashMap<(String, String), i32>,
}

impl DelaySnapshot {
    /// Adjustment (seconds) to apply to a scheduled time at `stop_id` on
    /// `trip_id`: the stop-level delay if known, else the trip-level delay,
    /// else zero.
    pub fn adjustment(&self, trip_id: &str, stop_id: &str) -> i32 {
        if let Some(delay) = self.stop_delay.get(&(trip_id.to_string(), stop_id.to_string())) {
            return *delay;
        }
        self.trip_delay.get(trip_id).copied().unwrap_or(0)
    }
}

pub struct DelayCache {
    client: reqwest::Client,
    url: Option<String>,
    snapshot: Arc<RwLock<DelaySnapshot>>,
}

impl DelayCache {
    pub fn new(url: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(6))
            .build()
            .expect("reqwest client builds with static config");

        Self {
            client,
            url,
            snapshot: Arc::new(RwLock::new(DelaySnapshot::default())),
        }
    }

    pub fn snapshot_handle(&self) -> Arc<RwLock<DelaySnapshot>> {
        self.snapshot.clone()
    }

    pub async fn snapshot(&self) -> DelaySnapshot {
        self.snapshot.read().await.clone()
    }

    /// Spawn the background poll loop. Runs until the process exits.
    pub fn spawn(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll_once().await {
                    warn!(error = %e, "Realtime delay poll failed, keeping previous snapshot");
                }
            }
        });
    }

    /// Fetch, decode, and atomically install one new snapshot. A no-op
    /// (success) when no feed URL is configured.
    pub async fn poll_once(&self) -> Result<(), GtfsError> {
        let Some(url) = self.url.as_ref() else {
            return Ok(());
        };

        let feed = fetch_feed(&self.client, url).await?;
        let new_snapshot = process_trip_updates(&feed);

        debug!(
            trips = new_snapshot.trip_delay.len(),
            stop_pairs = new_snapshot.stop_delay.len(),
            "Refreshed realtime delay snapshot"
        );

        let mut guard = self.snapshot.write().await;
        *guard = new_snapshot;
        Ok(())
    }
}

const MAX_PROTOBUF_SIZE: usize = 50 * 1024 * 1024;

async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<gtfs_realtime::FeedMessage, GtfsError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(GtfsError::NetworkMessage(format!(
            "GTFS-RT HTTP {}",
            response.status()
        )));
    }

    let bytes = response.bytes().await?;
    if bytes.len() > MAX_PROTOBUF_SIZE {
        return Err(GtfsError::NetworkMessage(format!(
            "GTFS-RT response too large: {} bytes",
            bytes.len()
        )));
    }

    gtfs_realtime::FeedMessage::decode(bytes.as_ref()).map_err(GtfsError::from)
}

/// Build a delay snapshot from a decoded feed. For each trip, the delay of
/// the first stop_time_update carrying a delay field sets the trip-level
/// delay; every stop_time_update with its own delay also sets a
/// finer-grained per-stop delay.
fn process_trip_updates(feed: &gtfs_realtime::FeedMessage) -> DelaySnapshot {
    let mut trip_delay = HashMap::new();
    let mut stop_delay = HashMap::new();

    for entity in &feed.entity {
        let Some(trip_update) = &entity.trip_update else {
            continue;
        };
        let Some(trip_id) = trip_update.trip.trip_id.clone() else {
            continue;
        };

        let mut trip_level_set = false;
        for stu in &trip_update.stop_time_update {
            let delay = stu
                .arrival
                .as_ref()
                .and_then(|e| e.delay)
                .or_else(|| stu.departure.as_ref().and_then(|e| e.delay));

            let Some(delay) = delay else {
                continue;
            };

            if !trip_level_set {
                trip_delay.insert(trip_id.clone(), delay);
                trip_level_set = true;
            }

            if let Some(stop_id) = stu.stop_id.clone() {
                stop_delay.insert((trip_id.clone(), stop_id), delay);
            }
        }

        if !trip_level_set {
            trip_delay.entry(trip_id).or_insert(0);
        }
    }

    info!(
        trips = trip_delay.len(),
        stop_pairs = stop_delay.len(),
        "Processed GTFS-RT trip updates"
    );

    DelaySnapshot { trip_delay, stop_delay }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_prefers_stop_level_over_trip_level() {
        let mut snap = DelaySnapshot::default();
        snap.trip_delay.insert("t1".into(), 30);
        snap.stop_delay.insert(("t1".into(), "s1".into()), 90);

        assert_eq!(snap.adjustment("t1", "s1"), 90);
        assert_eq!(snap.adjustment("t1", "s2"), 30);
        assert_eq!(snap.adjustment("unknown", "s1"), 0);
    }

    #[test]
    fn process_trip_updates_sets_trip_delay_from_first_stop_time_update() {
        use gtfs_realtime::trip_update::{StopTimeEvent, StopTimeUpdate};
        use gtfs_realtime::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};

        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".into(),
                ..Default::default()
            },
            entity: vec![FeedEntity {
                id: "e1".into(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        trip_id: Some("trip-1".into()),
                        ..Default::default()
                    },
                    stop_time_update: vec![
                        StopTimeUpdate {
                            stop_id: Some("s1".into()),
                            arrival: Some(StopTimeEvent {
                                delay: Some(60),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        StopTimeUpdate {
                            stop_id: Some("s2".into()),
                            arrival: Some(StopTimeEvent {
                                delay: Some(120),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };

        let snapshot = process_trip_updates(&feed);
        assert_eq!(snapshot.trip_delay.get("trip-1"), Some(&60));
        assert_eq!(snapshot.stop_delay.get(&("trip-1".to_string(), "s1".to_string())), Some(&60));
        assert_eq!(snapshot.stop_delay.get(&("trip-1".to_string(), "s2".to_string())), Some(&120));
    }
}
