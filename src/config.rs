//! Runtime configuration, sourced from environment variables rather than a
//! config file: this service is deployed as a single process next to its
//! GTFS data directory, with knobs tuned per-environment rather than checked
//! into a shared YAML file.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the unpacked static GTFS feed (stops.txt, routes.txt, ...).
    pub gtfs_dir: String,
    /// GTFS-Realtime TripUpdates URL. Absent means the realtime cache stays empty.
    pub trip_updates_url: Option<String>,
    pub poll_interval_secs: u64,
    pub report_decay_secs: i64,
    pub max_walk_meters: f64,
    pub danger_map_path: Option<String>,
    pub safety_zones_path: Option<String>,
    pub walk_directions_token: Option<String>,
    pub bind_addr: String,
}

impl Config {
    /// Load from the process environment, applying the same defaults the
    /// original service used.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gtfs_dir = env::var("GTFS_DIR")
            .map_err(|_| ConfigError::Missing("GTFS_DIR"))?;

        let poll_interval_secs = parse_env_or("POLL_INTERVAL_SECONDS", 12u64)?;
        let report_decay_secs = parse_env_or("REPORT_DECAY_SECONDS", 600i64)?;
        let max_walk_meters = parse_env_or("MAX_WALK_METERS", 800.0f64)?;

        Ok(Self {
            gtfs_dir,
            trip_updates_url: non_empty_env("TRIP_UPDATES_URL"),
            poll_interval_secs,
            report_decay_secs,
            max_walk_meters,
            danger_map_path: non_empty_env("DANGER_MAP_PATH"),
            safety_zones_path: non_empty_env("SAFETY_ZONES_PATH"),
            walk_directions_token: non_empty_env("WALK_DIRECTIONS_TOKEN"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_falls_back_to_default_when_unset() {
        env::remove_var("TEST_CONFIG_KNOB_ABSENT");
        let v: u64 = parse_env_or("TEST_CONFIG_KNOB_ABSENT", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parse_env_or_rejects_unparseable_value() {
        env::set_var("TEST_CONFIG_KNOB_BAD", "not-a-number");
        let err = parse_env_or::<u64>("TEST_CONFIG_KNOB_BAD", 42).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_, _)));
        env::remove_var("TEST_CONFIG_KNOB_BAD");
    }

    #[test]
    fn non_empty_env_treats_empty_string_as_absent() {
        env::set_var("TEST_CONFIG_KNOB_EMPTY", "");
        assert_eq!(non_empty_env("TEST_CONFIG_KNOB_EMPTY"), None);
        env::remove_var("TEST_CONFIG_KNOB_EMPTY");
    }
}
