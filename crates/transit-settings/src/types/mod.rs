//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the fields it overrides.

mod relay;
mod server;

pub use relay::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use transit_core::logging::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings type for the transit relay.
///
/// ```json
/// {
///   "server": { "port": 3000 },
///   "presence": { "staleThresholdMs": 45000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP/WebSocket listener settings.
    pub server: ServerSettings,
    /// Connection authorization.
    pub auth: AuthSettings,
    /// Session freshness and sweeping.
    pub presence: PresenceSettings,
    /// Nearest-vehicle and ETA defaults.
    pub proximity: ProximitySettings,
    /// Durable location history.
    pub history: HistorySettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.presence.sweep_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "presence.sweepIntervalMs",
                "must be greater than 0",
            ));
        }
        if self.presence.stale_threshold_ms == 0 {
            return Err(SettingsError::invalid(
                "presence.staleThresholdMs",
                "must be greater than 0",
            ));
        }
        if !(self.proximity.average_speed_kph.is_finite() && self.proximity.average_speed_kph > 0.0)
        {
            return Err(SettingsError::invalid(
                "proximity.averageSpeedKph",
                "must be a positive number",
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::invalid(
                "server.heartbeatIntervalSecs",
                "must be greater than 0",
            ));
        }
        if self.server.shutdown_timeout_secs == 0 {
            return Err(SettingsError::invalid(
                "server.shutdownTimeoutSecs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
