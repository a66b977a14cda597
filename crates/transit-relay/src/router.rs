//! Inbound event validation and dispatch.
//!
//! The router holds no relay state of its own. It validates each event and
//! applies it to the [`RelayState`] it is handed, so the worker stays the
//! only owner.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};
use transit_core::ConnectionId;
use transit_core::ids::is_well_formed_id;

use crate::connection::ClientConnection;
use crate::errors::RelayError;
use crate::history::{self, HistorySink, LocationRecord};
use crate::protocol::{InboundEvent, LocationUpdate, OutboundEvent, StartSharing};
use crate::state::{EndCause, RelayState};
use crate::telemetry::{RELAY_EVENTS_TOTAL, RELAY_REJECTED_TOTAL};

/// Maps inbound events onto presence and subscription operations.
#[derive(Clone)]
pub struct EventRouter {
    history: Arc<dyn HistorySink>,
}

impl EventRouter {
    /// Create a router writing accepted updates to `history`.
    pub fn new(history: Arc<dyn HistorySink>) -> Self {
        Self { history }
    }

    /// Decode and apply one text frame.
    ///
    /// Rejections are logged and counted here. The connection stays open
    /// either way.
    pub fn handle_frame(
        &self,
        state: &mut RelayState,
        connection: &Arc<ClientConnection>,
        text: &str,
        now: Instant,
    ) -> Result<(), RelayError> {
        let result = InboundEvent::decode(text).and_then(|event| {
            let name = event.name();
            self.dispatch(state, connection, event, now).map(|()| name)
        });
        match result {
            Ok(name) => {
                counter!(RELAY_EVENTS_TOTAL, "event" => name).increment(1);
                Ok(())
            }
            Err(e) => {
                counter!(RELAY_REJECTED_TOTAL, "reason" => e.kind()).increment(1);
                warn!(connection_id = %connection.id, error = %e, "dropping inbound event");
                Err(e)
            }
        }
    }

    /// Validate and apply a decoded event.
    pub fn dispatch(
        &self,
        state: &mut RelayState,
        connection: &Arc<ClientConnection>,
        event: InboundEvent,
        now: Instant,
    ) -> Result<(), RelayError> {
        match event {
            InboundEvent::StartSharing(start) => start_sharing(state, &connection.id, start),
            InboundEvent::LocationUpdate(update) => self.location_update(state, &update, now),
            InboundEvent::StopSharing(stop) => {
                check_id("operator_id", &stop.operator_id)?;
                if state.end_session(&stop.operator_id, EndCause::Stopped).is_none() {
                    debug!(operator_id = %stop.operator_id, "stop-sharing for inactive operator");
                }
                Ok(())
            }
            InboundEvent::SubscribeRoute(sel) => {
                check_id("route_id", &sel.route_id)?;
                let snapshot = state.presence.index().snapshot(&sel.route_id);
                let _ = state
                    .broker
                    .subscribe(Arc::clone(connection), sel.route_id, snapshot);
                Ok(())
            }
            InboundEvent::UnsubscribeRoute(sel) => {
                check_id("route_id", &sel.route_id)?;
                if !state.broker.unsubscribe(&connection.id, &sel.route_id) {
                    debug!(
                        connection_id = %connection.id,
                        route_id = %sel.route_id,
                        "unsubscribe from a route the connection is not on"
                    );
                }
                Ok(())
            }
        }
    }

    fn location_update(
        &self,
        state: &mut RelayState,
        update: &LocationUpdate,
        now: Instant,
    ) -> Result<(), RelayError> {
        check_id("operator_id", &update.operator_id)?;
        check_id("vehicle_id", &update.vehicle_id)?;
        check_id("route_id", &update.route_id)?;
        check_optional_finite("heading", update.heading)?;
        check_optional_finite("speed", update.speed)?;
        if update.speed.is_some_and(|s| s < 0.0) {
            return Err(RelayError::InvalidPayload("speed must not be negative".into()));
        }

        let session = state
            .presence
            .get(&update.operator_id)
            .ok_or_else(|| RelayError::UnknownOperator(update.operator_id.clone()))?;
        if session.vehicle_id != update.vehicle_id || session.route_id != update.route_id {
            return Err(RelayError::InvalidPayload(format!(
                "operator {} is sharing vehicle {} on route {}",
                session.operator_id, session.vehicle_id, session.route_id
            )));
        }

        let snapshot = state
            .presence
            .update_position(&update.operator_id, update.fix(), now)?;
        let recipients = state.broker.publish(
            &snapshot.route_id,
            &OutboundEvent::LocationUpdated(snapshot.clone()),
        );
        debug!(
            operator_id = %snapshot.operator_id,
            route_id = %snapshot.route_id,
            recipients,
            "location relayed"
        );

        drop(history::spawn_record(
            Arc::clone(&self.history),
            LocationRecord::from_snapshot(&snapshot, Utc::now()),
        ));
        Ok(())
    }
}

/// Tear down everything a closed connection owned.
///
/// Drops its route membership and ends every session it registered,
/// announcing `went-offline` for each. Returns the number of sessions ended.
pub fn connection_closed(state: &mut RelayState, connection_id: &ConnectionId) -> usize {
    let _ = state.broker.on_connection_closed(connection_id);
    let mut ended = 0;
    while let Some(operator_id) = state
        .presence
        .get_by_connection(connection_id)
        .map(|s| s.operator_id.clone())
    {
        let _ = state.end_session(&operator_id, EndCause::Disconnected);
        ended += 1;
    }
    ended
}

fn start_sharing(
    state: &mut RelayState,
    connection_id: &ConnectionId,
    start: StartSharing,
) -> Result<(), RelayError> {
    check_id("operator_id", &start.operator_id)?;
    check_id("vehicle_id", &start.vehicle_id)?;
    check_id("route_id", &start.route_id)?;

    let moved = |prev: &crate::presence::OperatorSession| {
        prev.route_id != start.route_id || prev.vehicle_id != start.vehicle_id
    };
    let replaced = state.presence.start_session(
        start.operator_id.clone(),
        start.vehicle_id.clone(),
        start.route_id.clone(),
        connection_id.clone(),
    );
    if let Some(prev) = replaced.filter(|prev| moved(prev)) {
        let _ = state.announce_offline(&prev);
        debug!(
            operator_id = %prev.operator_id,
            old_route_id = %prev.route_id,
            cause = EndCause::Replaced.as_str(),
            "operator moved to a new route or vehicle"
        );
    }
    Ok(())
}

fn check_id(field: &str, value: &str) -> Result<(), RelayError> {
    if is_well_formed_id(value) {
        Ok(())
    } else {
        Err(RelayError::InvalidPayload(format!("{field} is not a valid identifier")))
    }
}

fn check_optional_finite(field: &str, value: Option<f64>) -> Result<(), RelayError> {
    match value {
        Some(v) if !v.is_finite() => Err(RelayError::InvalidPayload(format!(
            "{field} must be a finite number"
        ))),
        _ => Ok(()),
    }
}
