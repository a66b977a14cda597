//! Domain constants.

use std::time::Duration;

use crate::geo::BoundingBox;

/// Mean Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Average jeepney speed in traffic, used when a vehicle's true speed is unknown.
pub const AVERAGE_VEHICLE_SPEED_KPH: f64 = 20.0;

/// Walking speed used for commuter-side estimates.
pub const WALKING_SPEED_KPH: f64 = 5.0;

/// A vehicle within this distance is "nearby".
pub const NEARBY_THRESHOLD_KM: f64 = 0.5;

/// A vehicle within this distance is "approaching".
pub const APPROACHING_THRESHOLD_KM: f64 = 0.2;

/// Default number of vehicles returned by nearest-vehicle queries.
pub const DEFAULT_NEAREST_LIMIT: usize = 5;

/// How often operator devices are expected to report.
pub const LOCATION_UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// An operator silent for longer than this is considered offline.
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(30);

/// How often the staleness sweep runs.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Geographic bounds of the Philippines.
pub const PH_BOUNDS: BoundingBox = BoundingBox {
    north: 21.12,
    south: 4.58,
    east: 126.6,
    west: 116.95,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered() {
        assert!(APPROACHING_THRESHOLD_KM < NEARBY_THRESHOLD_KM);
    }

    #[test]
    fn sweep_runs_more_often_than_threshold() {
        assert!(DEFAULT_SWEEP_INTERVAL < DEFAULT_STALE_THRESHOLD);
        assert!(LOCATION_UPDATE_INTERVAL < DEFAULT_STALE_THRESHOLD);
    }

    #[test]
    fn manila_is_inside_ph_bounds() {
        assert!(PH_BOUNDS.contains(14.5995, 120.9842));
    }
}
