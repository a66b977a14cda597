//! Presence, proximity, and history settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use transit_core::constants::{
    AVERAGE_VEHICLE_SPEED_KPH, DEFAULT_NEAREST_LIMIT, DEFAULT_STALE_THRESHOLD,
    DEFAULT_SWEEP_INTERVAL,
};

/// Session freshness settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresenceSettings {
    /// How often the staleness sweep runs, in milliseconds.
    pub sweep_interval_ms: u64,
    /// An operator silent for longer than this is evicted, in milliseconds.
    pub stale_threshold_ms: u64,
    /// Depth of the relay worker's command queue.
    pub command_buffer: usize,
}

impl PresenceSettings {
    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Stale threshold as a [`Duration`].
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_millis(self.stale_threshold_ms)
    }
}

impl Default for PresenceSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD.as_millis() as u64,
            command_buffer: 4096,
        }
    }
}

/// Nearest-vehicle and ETA defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProximitySettings {
    /// Vehicle speed assumed for ETA estimates, in km/h.
    pub average_speed_kph: f64,
    /// Vehicles returned when a query gives no limit.
    pub default_limit: usize,
    /// Upper bound on a query's requested limit.
    pub max_limit: usize,
}

impl Default for ProximitySettings {
    fn default() -> Self {
        Self {
            average_speed_kph: AVERAGE_VEHICLE_SPEED_KPH,
            default_limit: DEFAULT_NEAREST_LIMIT,
            max_limit: 50,
        }
    }
}

/// Durable location history settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistorySettings {
    /// Whether accepted updates are appended to the history database.
    pub enabled: bool,
    /// `SQLite` file path. Relative paths resolve against `~/.transit`.
    pub db_path: PathBuf,
}

impl HistorySettings {
    /// Absolute database path, resolving relative paths against `base`.
    pub fn resolved_db_path(&self, base: &std::path::Path) -> PathBuf {
        if self.db_path.is_absolute() {
            self.db_path.clone()
        } else {
            base.join(&self.db_path)
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from("history.db"),
        }
    }
}
