//! Location fixes reported by operators and the snapshots relayed to viewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::{Coordinate, Located};
use crate::ids::{OperatorId, RouteId, VehicleId};

/// A single position report from an operator device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Direction of travel in degrees from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Ground speed as reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// When the device took the fix.
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    /// The fix's position.
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Point-in-time copy of one broadcasting vehicle, as sent to viewers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Operator broadcasting this vehicle.
    pub operator_id: OperatorId,
    /// The vehicle.
    pub vehicle_id: VehicleId,
    /// Route the vehicle is serving.
    pub route_id: RouteId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Direction of travel in degrees from north.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Ground speed as reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// When the device took the fix.
    pub timestamp: DateTime<Utc>,
}

impl SessionSnapshot {
    /// Build a snapshot from session identity and its latest fix.
    pub fn from_fix(
        operator_id: OperatorId,
        vehicle_id: VehicleId,
        route_id: RouteId,
        fix: &PositionFix,
    ) -> Self {
        Self {
            operator_id,
            vehicle_id,
            route_id,
            latitude: fix.latitude,
            longitude: fix.longitude,
            heading: fix.heading,
            speed: fix.speed,
            timestamp: fix.timestamp,
        }
    }
}

impl Located for SessionSnapshot {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}
