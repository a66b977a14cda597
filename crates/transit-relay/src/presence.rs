//! In-memory registry of operators currently broadcasting.
//!
//! Every mutation that changes what a viewer would see also updates the
//! [`RouteIndex`], so the two never disagree.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use transit_core::geo::is_valid_coordinate;
use transit_core::{ConnectionId, OperatorId, PositionFix, RouteId, SessionSnapshot, VehicleId};

use crate::errors::RelayError;
use crate::route_index::RouteIndex;

/// One actively-broadcasting operator.
#[derive(Clone, Debug)]
pub struct OperatorSession {
    /// Operator identity.
    pub operator_id: OperatorId,
    /// Vehicle being driven.
    pub vehicle_id: VehicleId,
    /// Route being served.
    pub route_id: RouteId,
    /// Last accepted fix. `None` until the first location update.
    pub position: Option<PositionFix>,
    /// Monotonic time of session start or the last accepted update.
    pub last_update: Instant,
    /// Connection that registered the session.
    pub connection: ConnectionId,
}

impl OperatorSession {
    /// Snapshot of the session's current position, if it has one.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.position.as_ref().map(|fix| {
            SessionSnapshot::from_fix(
                self.operator_id.clone(),
                self.vehicle_id.clone(),
                self.route_id.clone(),
                fix,
            )
        })
    }

    /// Whether the session has been silent for longer than `threshold`.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_update) > threshold
    }
}

/// Operator → session map plus the derived route index.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: HashMap<OperatorId, OperatorSession>,
    index: RouteIndex,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the session for `operator_id`.
    ///
    /// Last writer wins. The replaced session, if any, is returned so the
    /// caller can notify its route. A restart on the same vehicle and route
    /// keeps the last known position and its index entry; otherwise the old
    /// entry is already gone.
    pub fn start_session(
        &mut self,
        operator_id: OperatorId,
        vehicle_id: VehicleId,
        route_id: RouteId,
        connection: ConnectionId,
    ) -> Option<OperatorSession> {
        let resumed = self
            .sessions
            .get(&operator_id)
            .is_some_and(|prev| prev.route_id == route_id && prev.vehicle_id == vehicle_id);
        let previous = if resumed {
            self.sessions.remove(&operator_id)
        } else {
            self.detach(&operator_id)
        };
        debug!(
            operator_id = %operator_id,
            vehicle_id = %vehicle_id,
            route_id = %route_id,
            replaced = previous.is_some(),
            resumed,
            "session started"
        );
        let position = previous
            .as_ref()
            .filter(|_| resumed)
            .and_then(|prev| prev.position.clone());
        let session = OperatorSession {
            operator_id: operator_id.clone(),
            vehicle_id,
            route_id,
            position,
            last_update: Instant::now(),
            connection,
        };
        let _ = self.sessions.insert(operator_id, session);
        previous
    }

    /// Record a new fix for an active session.
    ///
    /// The session is left untouched when the operator is unknown or the
    /// coordinate is out of range.
    pub fn update_position(
        &mut self,
        operator_id: &OperatorId,
        fix: PositionFix,
        now: Instant,
    ) -> Result<SessionSnapshot, RelayError> {
        let session = self
            .sessions
            .get_mut(operator_id)
            .ok_or_else(|| RelayError::UnknownOperator(operator_id.clone()))?;

        if !is_valid_coordinate(fix.latitude, fix.longitude) {
            return Err(RelayError::InvalidCoordinate {
                latitude: fix.latitude,
                longitude: fix.longitude,
            });
        }

        let snapshot = SessionSnapshot::from_fix(
            session.operator_id.clone(),
            session.vehicle_id.clone(),
            session.route_id.clone(),
            &fix,
        );
        session.position = Some(fix);
        session.last_update = now;
        self.index.upsert(session.route_id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Remove a session. Idempotent.
    pub fn end_session(&mut self, operator_id: &OperatorId) -> Option<OperatorSession> {
        let removed = self.detach(operator_id);
        if removed.is_some() {
            debug!(operator_id = %operator_id, "session ended");
        }
        removed
    }

    /// The session registered by `connection`, if any.
    pub fn get_by_connection(&self, connection: &ConnectionId) -> Option<&OperatorSession> {
        self.sessions.values().find(|s| &s.connection == connection)
    }

    /// The session for `operator_id`, if any.
    pub fn get(&self, operator_id: &OperatorId) -> Option<&OperatorSession> {
        self.sessions.get(operator_id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no operator is broadcasting.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Read access to the route index.
    pub fn index(&self) -> &RouteIndex {
        &self.index
    }

    /// Operators silent for longer than `threshold` as of `now`.
    pub fn stale_operators(&self, now: Instant, threshold: Duration) -> Vec<OperatorId> {
        let mut stale: Vec<OperatorId> = self
            .sessions
            .values()
            .filter(|s| s.is_stale(now, threshold))
            .map(|s| s.operator_id.clone())
            .collect();
        stale.sort();
        stale
    }

    fn detach(&mut self, operator_id: &OperatorId) -> Option<OperatorSession> {
        let session = self.sessions.remove(operator_id)?;
        // another operator may have since taken over the same vehicle
        let owns_entry = self
            .index
            .get(&session.route_id, &session.vehicle_id)
            .is_some_and(|entry| entry.operator_id == session.operator_id);
        if owns_entry {
            let _ = self.index.remove(&session.route_id, &session.vehicle_id);
        }
        Some(session)
    }
}
