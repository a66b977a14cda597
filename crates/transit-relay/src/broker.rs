//! Per-route subscriber groups and fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};
use transit_core::{ConnectionId, RouteId, SessionSnapshot};

use crate::connection::ClientConnection;
use crate::protocol::OutboundEvent;
use crate::telemetry::{RELAY_FANOUT_DELIVERIES_TOTAL, RELAY_FANOUT_DROPS_TOTAL};

/// Viewer membership by route.
///
/// A connection belongs to at most one route. Route groups are created on
/// first subscribe and removed when their last member leaves.
#[derive(Debug, Default)]
pub struct SubscriptionBroker {
    routes: HashMap<RouteId, HashMap<ConnectionId, Arc<ClientConnection>>>,
    membership: HashMap<ConnectionId, RouteId>,
}

impl SubscriptionBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `connection` into `route_id`'s group and send it `snapshot`.
    ///
    /// Any previous membership is dropped first. The `route-snapshot` frame
    /// is always sent, even when empty. Returns whether it was enqueued.
    pub fn subscribe(
        &mut self,
        connection: Arc<ClientConnection>,
        route_id: RouteId,
        snapshot: Vec<SessionSnapshot>,
    ) -> bool {
        let _ = self.leave(&connection.id);

        let vehicles = snapshot.len();
        let delivered = connection.send_event(&OutboundEvent::RouteSnapshot {
            route_id: route_id.clone(),
            vehicles: snapshot,
        });
        debug!(
            connection_id = %connection.id,
            route_id = %route_id,
            vehicles,
            delivered,
            "subscribed to route"
        );

        let _ = self
            .membership
            .insert(connection.id.clone(), route_id.clone());
        let _ = self
            .routes
            .entry(route_id)
            .or_default()
            .insert(connection.id.clone(), connection);
        delivered
    }

    /// Leave `route_id`. No-op unless the connection is a member of it.
    pub fn unsubscribe(&mut self, connection_id: &ConnectionId, route_id: &RouteId) -> bool {
        if self.membership.get(connection_id) != Some(route_id) {
            return false;
        }
        self.leave(connection_id).is_some()
    }

    /// Best-effort delivery of `event` to every subscriber of `route_id`.
    ///
    /// Never waits: a subscriber with a full or closed channel misses this
    /// event. Returns the number of subscribers it was enqueued for.
    pub fn publish(&self, route_id: &RouteId, event: &OutboundEvent) -> usize {
        let Some(subscribers) = self.routes.get(route_id) else {
            return 0;
        };
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = event.name(), error = %e, "failed to encode event");
                return 0;
            }
        };

        let mut delivered = 0;
        for connection in subscribers.values() {
            if connection.send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                counter!(RELAY_FANOUT_DROPS_TOTAL, "event" => event.name()).increment(1);
                debug!(
                    connection_id = %connection.id,
                    route_id = %route_id,
                    event = event.name(),
                    "subscriber channel full or closed, dropping event"
                );
            }
        }
        counter!(RELAY_FANOUT_DELIVERIES_TOTAL, "event" => event.name())
            .increment(delivered as u64);
        delivered
    }

    /// Forget a closed connection. Returns the route it was subscribed to.
    pub fn on_connection_closed(&mut self, connection_id: &ConnectionId) -> Option<RouteId> {
        self.leave(connection_id)
    }

    /// The route a connection is subscribed to.
    pub fn route_of(&self, connection_id: &ConnectionId) -> Option<&RouteId> {
        self.membership.get(connection_id)
    }

    /// Number of subscribers on a route.
    pub fn subscriber_count(&self, route_id: &RouteId) -> usize {
        self.routes.get(route_id).map_or(0, HashMap::len)
    }

    /// Number of routes with at least one subscriber.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    fn leave(&mut self, connection_id: &ConnectionId) -> Option<RouteId> {
        let route_id = self.membership.remove(connection_id)?;
        if let Some(members) = self.routes.get_mut(&route_id) {
            let _ = members.remove(connection_id);
            if members.is_empty() {
                let _ = self.routes.remove(&route_id);
            }
        }
        Some(route_id)
    }
}
