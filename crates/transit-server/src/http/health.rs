//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;
use transit_relay::RelayStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the relay worker runs, `"degraded"` otherwise.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current `WebSocket` connection count.
    pub connections: usize,
    /// Operators currently sharing a location.
    pub active_sessions: usize,
    /// Routes with at least one broadcasting vehicle.
    pub active_routes: usize,
}

/// Build a health response from live counters. `stats` is `None` when the
/// relay worker could not be reached.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    stats: Option<RelayStats>,
) -> HealthResponse {
    let status = if stats.is_some() { "ok" } else { "degraded" };
    let stats = stats.unwrap_or_default();
    HealthResponse {
        status: status.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_sessions: stats.active_sessions,
        active_routes: stats.active_routes,
    }
}
