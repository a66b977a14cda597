//! Route → active vehicles index.
//!
//! Owned by [`PresenceRegistry`](crate::presence::PresenceRegistry), which
//! is the only writer; everyone else reads snapshots.

use std::collections::{BTreeMap, HashMap};

use transit_core::{RouteId, SessionSnapshot, VehicleId};

/// Latest snapshot of every positioned vehicle, grouped by route.
#[derive(Debug, Default)]
pub struct RouteIndex {
    routes: HashMap<RouteId, BTreeMap<VehicleId, SessionSnapshot>>,
}

impl RouteIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a vehicle's entry under `route_id`.
    pub(crate) fn upsert(&mut self, route_id: RouteId, snapshot: SessionSnapshot) {
        let _ = self
            .routes
            .entry(route_id)
            .or_default()
            .insert(snapshot.vehicle_id.clone(), snapshot);
    }

    /// Remove a vehicle from a route. Routes left empty are dropped.
    pub(crate) fn remove(
        &mut self,
        route_id: &RouteId,
        vehicle_id: &VehicleId,
    ) -> Option<SessionSnapshot> {
        let vehicles = self.routes.get_mut(route_id)?;
        let removed = vehicles.remove(vehicle_id);
        if vehicles.is_empty() {
            let _ = self.routes.remove(route_id);
        }
        removed
    }

    /// Current vehicles on a route, ordered by vehicle ID. Empty for unknown routes.
    pub fn snapshot(&self, route_id: &RouteId) -> Vec<SessionSnapshot> {
        self.routes
            .get(route_id)
            .map(|vehicles| vehicles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Current vehicles across every route.
    pub fn all_snapshots(&self) -> Vec<SessionSnapshot> {
        let mut all: Vec<SessionSnapshot> = self
            .routes
            .values()
            .flat_map(|vehicles| vehicles.values().cloned())
            .collect();
        all.sort_by(|a, b| {
            a.route_id
                .cmp(&b.route_id)
                .then_with(|| a.vehicle_id.cmp(&b.vehicle_id))
        });
        all
    }

    /// A vehicle's entry under a route.
    pub fn get(&self, route_id: &RouteId, vehicle_id: &VehicleId) -> Option<&SessionSnapshot> {
        self.routes.get(route_id)?.get(vehicle_id)
    }

    /// Whether a vehicle is listed under a route.
    pub fn contains(&self, route_id: &RouteId, vehicle_id: &VehicleId) -> bool {
        self.routes
            .get(route_id)
            .is_some_and(|vehicles| vehicles.contains_key(vehicle_id))
    }

    /// Number of routes with at least one vehicle.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Number of vehicles across all routes.
    pub fn vehicle_count(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(vehicle: &str, route: &str, lat: f64) -> SessionSnapshot {
        SessionSnapshot {
            operator_id: format!("op-{vehicle}").into(),
            vehicle_id: vehicle.into(),
            route_id: route.into(),
            latitude: lat,
            longitude: 121.0,
            heading: None,
            speed: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn upsert_replaces_by_vehicle() {
        let mut index = RouteIndex::new();
        index.upsert("r1".into(), snap("v1", "r1", 14.0));
        index.upsert("r1".into(), snap("v1", "r1", 14.5));
        let members = index.snapshot(&"r1".into());
        assert_eq!(members.len(), 1);
        assert!((members[0].latitude - 14.5).abs() < f64::EPSILON);
    }

    #[test]
    fn remove_drops_empty_route() {
        let mut index = RouteIndex::new();
        index.upsert("r1".into(), snap("v1", "r1", 14.0));
        assert_eq!(index.route_count(), 1);
        let removed = index.remove(&"r1".into(), &"v1".into());
        assert!(removed.is_some());
        assert_eq!(index.route_count(), 0);
        assert!(index.snapshot(&"r1".into()).is_empty());
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut index = RouteIndex::new();
        assert!(index.remove(&"r1".into(), &"v1".into()).is_none());
        index.upsert("r1".into(), snap("v1", "r1", 14.0));
        assert!(index.remove(&"r1".into(), &"v2".into()).is_none());
        assert_eq!(index.vehicle_count(), 1);
    }

    #[test]
    fn snapshot_unknown_route_is_empty() {
        let index = RouteIndex::new();
        assert!(index.snapshot(&"nowhere".into()).is_empty());
    }

    #[test]
    fn all_snapshots_spans_routes() {
        let mut index = RouteIndex::new();
        index.upsert("r2".into(), snap("v3", "r2", 14.0));
        index.upsert("r1".into(), snap("v2", "r1", 14.0));
        index.upsert("r1".into(), snap("v1", "r1", 14.0));
        let all = index.all_snapshots();
        let ids: Vec<&str> = all.iter().map(|s| s.vehicle_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
        assert_eq!(index.vehicle_count(), 3);
        assert_eq!(index.route_count(), 2);
        assert!(index.contains(&"r2".into(), &"v3".into()));
        assert!(!index.contains(&"r1".into(), &"v3".into()));
    }
}
