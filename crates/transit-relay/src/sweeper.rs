//! Staleness sweep.
//!
//! The worker runs [`sweep`] on every tick of [`sweep_interval`]. Each
//! stale session is ended on its own; a session refreshed between ticks is
//! simply not selected.

use std::time::Duration;

use metrics::histogram;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::presence::OperatorSession;
use crate::state::{EndCause, RelayState};
use crate::telemetry::RELAY_SWEEP_DURATION_SECONDS;

/// Tick source for the sweep. First tick fires one `period` from now.
///
/// Ticks missed while a sweep runs are delayed rather than bunched.
pub fn sweep_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// End every session silent for longer than `threshold` as of `now`,
/// announcing `went-offline` for each. Returns the evicted sessions.
pub fn sweep(state: &mut RelayState, now: Instant, threshold: Duration) -> Vec<OperatorSession> {
    let started = std::time::Instant::now();
    let evicted: Vec<OperatorSession> = state
        .presence
        .stale_operators(now, threshold)
        .into_iter()
        .filter_map(|operator_id| state.end_session(&operator_id, EndCause::Stale))
        .collect();
    histogram!(RELAY_SWEEP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if !evicted.is_empty() {
        debug!(
            evicted = evicted.len(),
            remaining = state.presence.len(),
            "sweep evicted stale operators"
        );
    }
    evicted
}
