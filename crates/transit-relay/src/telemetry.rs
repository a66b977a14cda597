//! Metric names recorded by the relay core.
//!
//! Recorded through the `metrics` facade; the server installs the
//! Prometheus recorder that renders them.

/// Inbound events accepted (counter, labels: event).
pub const RELAY_EVENTS_TOTAL: &str = "relay_events_total";
/// Inbound events rejected (counter, labels: event, reason).
pub const RELAY_REJECTED_TOTAL: &str = "relay_rejected_total";
/// Active operator sessions (gauge).
pub const RELAY_SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Sessions ended (counter, labels: cause).
pub const RELAY_SESSIONS_ENDED_TOTAL: &str = "relay_sessions_ended_total";
/// Routes with at least one subscriber (gauge).
pub const RELAY_SUBSCRIBED_ROUTES: &str = "relay_subscribed_routes";
/// Frames delivered to subscribers (counter, labels: event).
pub const RELAY_FANOUT_DELIVERIES_TOTAL: &str = "relay_fanout_deliveries_total";
/// Frames dropped for a full or closed subscriber channel (counter, labels: event).
pub const RELAY_FANOUT_DROPS_TOTAL: &str = "relay_fanout_drops_total";
/// Staleness sweep duration (histogram).
pub const RELAY_SWEEP_DURATION_SECONDS: &str = "relay_sweep_duration_seconds";
/// History rows written (counter).
pub const HISTORY_WRITES_TOTAL: &str = "history_writes_total";
/// History writes that failed (counter).
pub const HISTORY_WRITE_FAILURES_TOTAL: &str = "history_write_failures_total";
