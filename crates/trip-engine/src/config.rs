//! Engine configuration from environment.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Geofence radius for stop completion, meters.
    pub completion_threshold_m: f64,
    /// Settle time before a route recomputation is issued.
    pub debounce: Duration,
    /// Fixed interval of the position poll source.
    pub poll_interval: Duration,
    /// Consecutive poll failures before tracking is flagged degraded.
    pub max_poll_failures: u32,
    /// Largest per-tick movement credited to the fare, kilometers.
    pub glitch_cap_km: f64,
    /// Interval of the out-of-band backend cost poll.
    pub cost_sync_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            completion_threshold_m: 30.0,
            debounce: Duration::from_secs(2),
            poll_interval: Duration::from_secs(5),
            max_poll_failures: 5,
            glitch_cap_km: 0.25,
            cost_sync_interval: Duration::from_secs(15),
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            completion_threshold_m: env_f64("TRIP_COMPLETION_THRESHOLD_M")
                .unwrap_or(defaults.completion_threshold_m),
            debounce: env_u64("TRIP_DEBOUNCE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
            poll_interval: env_u64("TRIP_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_poll_failures: env_u64("TRIP_MAX_POLL_FAILURES")
                .map(|v| v as u32)
                .unwrap_or(defaults.max_poll_failures),
            glitch_cap_km: env_f64("TRIP_GLITCH_CAP_KM").unwrap_or(defaults.glitch_cap_km),
            cost_sync_interval: env_u64("TRIP_COST_SYNC_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cost_sync_interval),
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
