//! The relay's mutable state, owned by a single worker task.

use metrics::{counter, gauge};
use serde::Serialize;
use tracing::{debug, info};
use transit_core::OperatorId;

use crate::broker::SubscriptionBroker;
use crate::presence::{OperatorSession, PresenceRegistry};
use crate::protocol::OutboundEvent;
use crate::telemetry::{
    RELAY_SESSIONS_ACTIVE, RELAY_SESSIONS_ENDED_TOTAL, RELAY_SUBSCRIBED_ROUTES,
};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndCause {
    /// The operator sent `stop-sharing`.
    Stopped,
    /// The operator's connection closed.
    Disconnected,
    /// No update within the stale threshold.
    Stale,
    /// A new `start-sharing` for the same operator moved it elsewhere.
    Replaced,
}

impl EndCause {
    /// Label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Disconnected => "disconnected",
            Self::Stale => "stale",
            Self::Replaced => "replaced",
        }
    }
}

/// Point-in-time relay counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Active operator sessions.
    pub active_sessions: usize,
    /// Vehicles with a known position.
    pub active_vehicles: usize,
    /// Routes with at least one positioned vehicle.
    pub active_routes: usize,
    /// Routes with at least one subscriber.
    pub subscribed_routes: usize,
}

/// Presence and subscription state for one relay instance.
#[derive(Debug, Default)]
pub struct RelayState {
    /// Operator sessions and the derived route index.
    pub presence: PresenceRegistry,
    /// Viewer membership by route.
    pub broker: SubscriptionBroker,
}

impl RelayState {
    /// Create empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// End a session and tell its route's viewers the vehicle went offline,
    /// unless another operator still broadcasts that vehicle.
    pub fn end_session(
        &mut self,
        operator_id: &OperatorId,
        cause: EndCause,
    ) -> Option<OperatorSession> {
        let session = self.presence.end_session(operator_id)?;
        let recipients = self.announce_offline(&session);
        counter!(RELAY_SESSIONS_ENDED_TOTAL, "cause" => cause.as_str()).increment(1);
        info!(
            operator_id = %session.operator_id,
            vehicle_id = %session.vehicle_id,
            route_id = %session.route_id,
            cause = cause.as_str(),
            recipients,
            "operator went offline"
        );
        Some(session)
    }

    /// Publish `went-offline` for `session` to its route.
    ///
    /// Skipped while the route index still lists the vehicle, which happens
    /// when another operator has taken it over. Returns the recipient count.
    pub fn announce_offline(&self, session: &OperatorSession) -> usize {
        if self
            .presence
            .index()
            .contains(&session.route_id, &session.vehicle_id)
        {
            debug!(
                vehicle_id = %session.vehicle_id,
                route_id = %session.route_id,
                "vehicle still broadcast by another operator"
            );
            return 0;
        }
        self.broker.publish(
            &session.route_id,
            &OutboundEvent::WentOffline {
                vehicle_id: session.vehicle_id.clone(),
                route_id: session.route_id.clone(),
            },
        )
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        let index = self.presence.index();
        RelayStats {
            active_sessions: self.presence.len(),
            active_vehicles: index.vehicle_count(),
            active_routes: index.route_count(),
            subscribed_routes: self.broker.route_count(),
        }
    }

    /// Push the current session and subscription counts to the gauges.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_gauges(&self) {
        gauge!(RELAY_SESSIONS_ACTIVE).set(self.presence.len() as f64);
        gauge!(RELAY_SUBSCRIBED_ROUTES).set(self.broker.route_count() as f64);
    }
}
