//! Wire protocol for relay connections.
//!
//! Every frame is a JSON text message `{"type": <event>, "data": {...}}`.
//! Field names are `snake_case`. The `driver:` / `commuter:` prefixed event
//! names used by older mobile builds are accepted as aliases.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use transit_core::{ConnectionId, OperatorId, PositionFix, RouteId, SessionSnapshot, VehicleId};

use crate::errors::RelayError;

/// `start-sharing` payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StartSharing {
    /// Operator starting the broadcast.
    pub operator_id: OperatorId,
    /// Route being served.
    pub route_id: RouteId,
    /// Vehicle being driven.
    pub vehicle_id: VehicleId,
}

/// `location-update` payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LocationUpdate {
    /// Reporting operator.
    pub operator_id: OperatorId,
    /// Vehicle the operator registered.
    pub vehicle_id: VehicleId,
    /// Route the operator registered.
    pub route_id: RouteId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Direction of travel in degrees from north.
    #[serde(default)]
    pub heading: Option<f64>,
    /// Ground speed as reported by the device.
    #[serde(default)]
    pub speed: Option<f64>,
    /// RFC 3339 time the device took the fix.
    pub timestamp: DateTime<Utc>,
}

impl LocationUpdate {
    /// The position part of the update.
    pub fn fix(&self) -> PositionFix {
        PositionFix {
            latitude: self.latitude,
            longitude: self.longitude,
            heading: self.heading,
            speed: self.speed,
            timestamp: self.timestamp,
        }
    }
}

/// `stop-sharing` payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StopSharing {
    /// Operator ending the broadcast.
    pub operator_id: OperatorId,
}

/// `subscribe-route` / `unsubscribe-route` payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RouteSelector {
    /// Route to join or leave.
    pub route_id: RouteId,
}

/// Events a client may send to the relay.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundEvent {
    /// Operator begins broadcasting a vehicle on a route.
    #[serde(rename = "start-sharing", alias = "driver:start-sharing")]
    StartSharing(StartSharing),
    /// Operator reports a new position.
    #[serde(rename = "location-update", alias = "driver:location-update")]
    LocationUpdate(LocationUpdate),
    /// Operator ends the broadcast.
    #[serde(rename = "stop-sharing", alias = "driver:stop-sharing")]
    StopSharing(StopSharing),
    /// Viewer joins a route's subscriber group.
    #[serde(rename = "subscribe-route", alias = "commuter:subscribe-route")]
    SubscribeRoute(RouteSelector),
    /// Viewer leaves a route's subscriber group.
    #[serde(rename = "unsubscribe-route", alias = "commuter:unsubscribe-route")]
    UnsubscribeRoute(RouteSelector),
}

impl InboundEvent {
    /// Parse a text frame.
    pub fn decode(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Event name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartSharing(_) => "start-sharing",
            Self::LocationUpdate(_) => "location-update",
            Self::StopSharing(_) => "stop-sharing",
            Self::SubscribeRoute(_) => "subscribe-route",
            Self::UnsubscribeRoute(_) => "unsubscribe-route",
        }
    }
}

/// Events the relay sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundEvent {
    /// First frame on every connection.
    #[serde(rename = "connection.established")]
    ConnectionEstablished {
        /// The relay-assigned connection ID.
        connection_id: ConnectionId,
    },
    /// A vehicle on the subscribed route moved.
    #[serde(rename = "location-updated")]
    LocationUpdated(SessionSnapshot),
    /// A vehicle on the subscribed route stopped broadcasting.
    #[serde(rename = "went-offline")]
    WentOffline {
        /// The vehicle that went offline.
        vehicle_id: VehicleId,
        /// Its route.
        route_id: RouteId,
    },
    /// Current members of a route, sent on subscribe.
    #[serde(rename = "route-snapshot")]
    RouteSnapshot {
        /// The subscribed route.
        route_id: RouteId,
        /// Every vehicle currently broadcasting on it.
        vehicles: Vec<SessionSnapshot>,
    },
}

impl OutboundEvent {
    /// Event name used in logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection.established",
            Self::LocationUpdated(_) => "location-updated",
            Self::WentOffline { .. } => "went-offline",
            Self::RouteSnapshot { .. } => "route-snapshot",
        }
    }

    /// Serialize to a shareable text frame.
    pub fn encode(&self) -> Result<Arc<String>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_start_sharing() {
        let frame = json!({
            "type": "start-sharing",
            "data": {"operator_id": "op-1", "route_id": "r1", "vehicle_id": "v1"}
        })
        .to_string();
        let event = InboundEvent::decode(&frame).unwrap();
        assert_matches!(event, InboundEvent::StartSharing(s) => {
            assert_eq!(s.operator_id.as_str(), "op-1");
            assert_eq!(s.route_id.as_str(), "r1");
            assert_eq!(s.vehicle_id.as_str(), "v1");
        });
    }

    #[test]
    fn decode_location_update_with_optional_fields() {
        let frame = json!({
            "type": "location-update",
            "data": {
                "operator_id": "op-1", "vehicle_id": "v1", "route_id": "r1",
                "latitude": 14.5995, "longitude": 120.9842,
                "timestamp": "2024-05-01T08:00:00Z"
            }
        })
        .to_string();
        let event = InboundEvent::decode(&frame).unwrap();
        assert_matches!(event, InboundEvent::LocationUpdate(u) => {
            assert!(u.heading.is_none());
            assert!(u.speed.is_none());
            assert_eq!(u.fix().timestamp.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        });
    }

    #[test]
    fn decode_accepts_prefixed_aliases() {
        let frame = json!({"type": "commuter:subscribe-route", "data": {"route_id": "r9"}})
            .to_string();
        let event = InboundEvent::decode(&frame).unwrap();
        assert_eq!(event.name(), "subscribe-route");
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let frame = json!({"type": "teleport", "data": {}}).to_string();
        assert_matches!(InboundEvent::decode(&frame), Err(RelayError::InvalidPayload(_)));
    }

    #[test]
    fn decode_rejects_missing_timestamp() {
        let frame = json!({
            "type": "location-update",
            "data": {"operator_id": "op", "vehicle_id": "v", "route_id": "r",
                     "latitude": 1.0, "longitude": 1.0}
        })
        .to_string();
        assert_matches!(InboundEvent::decode(&frame), Err(RelayError::InvalidPayload(_)));
    }

    #[test]
    fn decode_rejects_bad_timestamp() {
        let frame = json!({
            "type": "location-update",
            "data": {"operator_id": "op", "vehicle_id": "v", "route_id": "r",
                     "latitude": 1.0, "longitude": 1.0, "timestamp": "yesterday"}
        })
        .to_string();
        assert!(InboundEvent::decode(&frame).is_err());
    }

    #[test]
    fn decode_rejects_non_json() {
        assert!(InboundEvent::decode("hello").is_err());
    }

    #[test]
    fn went_offline_wire_shape() {
        let event = OutboundEvent::WentOffline {
            vehicle_id: "v1".into(),
            route_id: "r1".into(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "went-offline", "data": {"vehicle_id": "v1", "route_id": "r1"}})
        );
    }

    #[test]
    fn location_updated_carries_snapshot_fields() {
        let snapshot = SessionSnapshot {
            operator_id: "op".into(),
            vehicle_id: "v".into(),
            route_id: "r".into(),
            latitude: 14.6,
            longitude: 121.0,
            heading: Some(90.0),
            speed: None,
            timestamp: "2024-05-01T08:00:00Z".parse().unwrap(),
        };
        let value: serde_json::Value = serde_json::from_str(
            &OutboundEvent::LocationUpdated(snapshot).encode().unwrap(),
        )
        .unwrap();
        assert_eq!(value["type"], "location-updated");
        assert_eq!(value["data"]["latitude"], 14.6);
        assert_eq!(value["data"]["heading"], 90.0);
        assert!(value["data"].get("speed").is_none());
    }

    #[test]
    fn connection_established_name() {
        let event = OutboundEvent::ConnectionEstablished {
            connection_id: "c1".into(),
        };
        assert_eq!(event.name(), "connection.established");
        let value: serde_json::Value =
            serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(value["data"]["connection_id"], "c1");
    }
}
