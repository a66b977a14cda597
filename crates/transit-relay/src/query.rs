//! Nearest-vehicle and ETA answers computed over route snapshots.

use serde::Serialize;
use transit_core::geo::{eta_minutes, nearest, round_km};
use transit_core::{Coordinate, ProximityBand, SessionSnapshot};

use crate::errors::RelayError;

/// A vehicle ranked by distance from a query point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NearbyVehicle {
    /// The vehicle's latest snapshot.
    #[serde(flatten)]
    pub vehicle: SessionSnapshot,
    /// Distance from the query point, rounded to two decimals.
    pub distance_km: f64,
    /// Minutes until the vehicle reaches the query point at the assumed speed.
    pub eta_minutes: Option<u32>,
    /// Coarse closeness band.
    pub proximity: ProximityBand,
}

/// Answer to an ETA query.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EtaEstimate {
    /// Minutes until the nearest vehicle reaches the origin. `None` when no
    /// vehicle is active.
    pub eta_minutes: Option<u32>,
    /// Straight-line origin → destination distance, rounded to two decimals.
    pub distance_km: f64,
    /// Closest vehicles to the origin, nearest first.
    pub nearest: Vec<NearbyVehicle>,
    /// Explanation when there is no estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Validate a query point.
pub fn checked_point(latitude: f64, longitude: f64) -> Result<Coordinate, RelayError> {
    let point = Coordinate::new(latitude, longitude);
    if point.is_valid() {
        Ok(point)
    } else {
        Err(RelayError::InvalidCoordinate {
            latitude,
            longitude,
        })
    }
}

/// Resolve a requested result count against the configured default and cap.
pub fn effective_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

/// The `limit` vehicles closest to `origin`.
pub fn nearest_vehicles(
    vehicles: Vec<SessionSnapshot>,
    origin: Coordinate,
    limit: usize,
    speed_kph: f64,
) -> Vec<NearbyVehicle> {
    nearest(origin, vehicles, limit)
        .into_iter()
        .map(|ranked| NearbyVehicle {
            vehicle: ranked.item,
            distance_km: round_km(ranked.distance_km),
            eta_minutes: eta_minutes(ranked.distance_km, speed_kph),
            proximity: ProximityBand::classify(ranked.distance_km),
        })
        .collect()
}

/// ETA of the nearest vehicle to `origin`, plus the trip distance.
pub fn estimate_eta(
    vehicles: Vec<SessionSnapshot>,
    origin: Coordinate,
    destination: Coordinate,
    limit: usize,
    speed_kph: f64,
) -> EtaEstimate {
    let distance_km = round_km(origin.distance_to(&destination));
    let nearest = nearest_vehicles(vehicles, origin, limit, speed_kph);
    let eta = nearest.first().and_then(|v| v.eta_minutes);
    let message = nearest
        .is_empty()
        .then(|| "No active vehicles found".to_string());
    EtaEstimate {
        eta_minutes: eta,
        distance_km,
        nearest,
        message,
    }
}
