//! Crowd report storage and fusion. The store itself is an opaque adapter
//! boundary — `ReportStore` is the only thing the rest of the engine
//! depends on; a real deployment backs it with a database, which is out of
//! scope here. `InMemoryReportStore` is the shipped implementation, good
//! enough for a single-process deployment and for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A single crowd-sourced arrival observation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CrowdReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stop_id: String,
    pub line_id: Option<String>,
    /// Seconds until the reporter expects (or saw) the vehicle arrive.
    pub arrival_seconds: i64,
    pub mode: Option<String>,
}

/// Payload accepted from callers; the store assigns `id` and `timestamp`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CrowdReportIn {
    pub stop_id: String,
    pub line_id: Option<String>,
    pub arrival_seconds: i64,
    pub mode: Option<String>,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn append(&self, report: CrowdReportIn) -> CrowdReport;
    async fn query(&self, stop_id: &str, line_id: Option<&str>, since: DateTime<Utc>) -> Vec<CrowdReport>;
}

/// In-memory implementation, keyed by stop_id. Not durable across restarts
/// — the real record store this stands in for is explicitly out of scope.
#[derive(Default)]
pub struct InMemoryReportStore {
    by_stop: RwLock<HashMap<String, Vec<CrowdReport>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn append(&self, report: CrowdReportIn) -> CrowdReport {
        let stored = CrowdReport {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            stop_id: report.stop_id.clone(),
            line_id: report.line_id,
            arrival_seconds: report.arrival_seconds,
            mode: report.mode,
        };
        self.by_stop
            .write()
            .expect("report store lock not poisoned")
            .entry(report.stop_id)
            .or_default()
            .push(stored.clone());
        stored
    }

    async fn query(&self, stop_id: &str, line_id: Option<&str>, since: DateTime<Utc>) -> Vec<CrowdReport> {
        self.by_stop
            .read()
            .expect("report store lock not poisoned")
            .get(stop_id)
            .map(|reports| {
                reports
                    .iter()
                    .filter(|r| r.timestamp >= since)
                    .filter(|r| line_id.map_or(true, |want| r.line_id.as_deref() == Some(want)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Recency-weighted mean arrival estimate over a set of reports with known
/// ages (in seconds). `None` when no report has positive weight.
pub fn weighted_avg(reports: &[(i64, i64)], decay_secs: i64) -> Option<f64> {
    let decay = decay_secs.max(1) as f64;
    let mut total = 0.0;
    let mut total_weight = 0.0;
    for &(arrival_seconds, age_seconds) in reports {
        let weight = (-(age_seconds as f64) / decay).exp();
        total += arrival_seconds as f64 * weight;
        total_weight += weight;
    }
    if total_weight > 0.0 {
        Some(total / total_weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_query_returns_the_report() {
        let store = InMemoryReportStore::new();
        store
            .append(CrowdReportIn {
                stop_id: "S1".into(),
                line_id: Some("42".into()),
                arrival_seconds: 180,
                mode: None,
            })
            .await;

        let results = store.query("S1", None, Utc::now() - chrono::Duration::seconds(60)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].arrival_seconds, 180);
    }

    #[tokio::test]
    async fn query_filters_by_line_id_and_since() {
        let store = InMemoryReportStore::new();
        store
            .append(CrowdReportIn { stop_id: "S1".into(), line_id: Some("42".into()), arrival_seconds: 100, mode: None })
            .await;
        store
            .append(CrowdReportIn { stop_id: "S1".into(), line_id: Some("7".into()), arrival_seconds: 200, mode: None })
            .await;

        let results = store.query("S1", Some("42"), Utc::now() - chrono::Duration::seconds(60)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].arrival_seconds, 100);

        let future_cutoff = Utc::now() + chrono::Duration::seconds(60);
        assert!(store.query("S1", None, future_cutoff).await.is_empty());
    }

    #[test]
    fn weighted_avg_is_none_for_empty_input() {
        assert_eq!(weighted_avg(&[], 600), None);
    }

    #[test]
    fn weighted_avg_is_exact_for_identical_arrivals() {
        let reports = vec![(240, 0), (240, 600), (240, 3000)];
        let avg = weighted_avg(&reports, 600).unwrap();
        assert!((avg - 240.0).abs() < 1e-6);
    }

    #[test]
    fn weighted_avg_matches_worked_example() {
        // age 0 -> weight 1, age 300 -> weight exp(-0.5)
        let reports = vec![(240, 0), (360, 300)];
        let avg = weighted_avg(&reports, 600).unwrap();
        let w2 = (-0.5f64).exp();
        let expected = (240.0 + 360.0 * w2) / (1.0 + w2);
        assert!((avg - expected).abs() < 1e-9);
        assert_eq!(avg.round() as i64, 285);
    }
}
