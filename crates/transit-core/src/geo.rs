//! Great-circle geometry and arrival estimates.
//!
//! All functions are pure. Distances are in kilometres, angles in degrees,
//! speeds in km/h.

use serde::{Deserialize, Serialize};

use crate::constants::{APPROACHING_THRESHOLD_KM, EARTH_RADIUS_KM, NEARBY_THRESHOLD_KM};

/// A WGS84 point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate without validating it.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and in range.
    pub fn is_valid(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }

    /// Distance to `other` in kilometres.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Anything that sits at a point on the map.
pub trait Located {
    /// Current position.
    fn coordinate(&self) -> Coordinate;
}

impl Located for Coordinate {
    fn coordinate(&self) -> Coordinate {
        *self
    }
}

/// Whether latitude lies in `[-90, 90]` and longitude in `[-180, 180]`.
///
/// NaN and infinities are rejected.
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

/// Haversine great-circle distance between two points.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards against a > 1 from rounding at antipodal points.
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial bearing from the first point towards the second, in `[0, 360)`.
pub fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let y = d_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Minutes to cover `distance_km` at `speed_kph`, rounded to the nearest minute.
///
/// Returns `None` when the speed is not a positive finite number or the
/// distance is negative or not finite.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn eta_minutes(distance_km: f64, speed_kph: f64) -> Option<u32> {
    if !(speed_kph.is_finite() && speed_kph > 0.0) {
        return None;
    }
    if !(distance_km.is_finite() && distance_km >= 0.0) {
        return None;
    }
    let minutes = (distance_km / speed_kph * 60.0).round();
    (minutes <= f64::from(u32::MAX)).then_some(minutes as u32)
}

/// Round a distance to two decimal places for display.
pub fn round_km(distance_km: f64) -> f64 {
    (distance_km * 100.0).round() / 100.0
}

/// How close a vehicle is to a viewer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityBand {
    /// Within [`APPROACHING_THRESHOLD_KM`].
    Approaching,
    /// Within [`NEARBY_THRESHOLD_KM`].
    Nearby,
    /// Further away.
    Far,
}

impl ProximityBand {
    /// Classify a distance.
    pub fn classify(distance_km: f64) -> Self {
        if distance_km <= APPROACHING_THRESHOLD_KM {
            Self::Approaching
        } else if distance_km <= NEARBY_THRESHOLD_KM {
            Self::Nearby
        } else {
            Self::Far
        }
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Northern latitude limit.
    pub north: f64,
    /// Southern latitude limit.
    pub south: f64,
    /// Eastern longitude limit.
    pub east: f64,
    /// Western longitude limit.
    pub west: f64,
}

impl BoundingBox {
    /// Whether the point lies inside the box (edges inclusive).
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude)
            && (self.west..=self.east).contains(&longitude)
    }
}

/// An item paired with its distance from a query point.
#[derive(Clone, Debug, PartialEq)]
pub struct Ranked<T> {
    /// The ranked item.
    pub item: T,
    /// Distance from the query point in kilometres.
    pub distance_km: f64,
}

/// The `limit` items closest to `point`, nearest first.
///
/// The sort is stable: items at equal distance keep their input order.
pub fn nearest<T, I>(point: Coordinate, items: I, limit: usize) -> Vec<Ranked<T>>
where
    T: Located,
    I: IntoIterator<Item = T>,
{
    let mut ranked: Vec<Ranked<T>> = items
        .into_iter()
        .map(|item| {
            let distance_km = point.distance_to(&item.coordinate());
            Ranked { item, distance_km }
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MANILA: Coordinate = Coordinate::new(14.60, 120.98);

    #[test]
    fn same_point_is_zero() {
        assert!(distance_km(14.6, 120.98, 14.6, 120.98).abs() < f64::EPSILON);
    }

    #[test]
    fn one_hundredth_degree_of_latitude() {
        let d = distance_km(14.60, 120.98, 14.61, 120.98);
        assert!((d - 1.112).abs() < 0.001, "got {d}");
    }

    #[test]
    fn manila_to_cebu() {
        // Roughly 570 km.
        let d = distance_km(14.5995, 120.9842, 10.3157, 123.8854);
        assert!((560.0..580.0).contains(&d), "got {d}");
    }

    #[test]
    fn antipodes_are_half_circumference() {
        let d = distance_km(0.0, 0.0, 0.0, 180.0);
        let half = std::f64::consts::PI * EARTH_RADIUS_KM;
        assert!((d - half).abs() < 1e-6);
    }

    #[test]
    fn eta_scenario_three_minutes() {
        let d = distance_km(14.60, 120.98, 14.61, 120.98);
        assert_eq!(eta_minutes(d, 20.0), Some(3));
    }

    #[test]
    fn eta_zero_distance() {
        assert_eq!(eta_minutes(0.0, 20.0), Some(0));
    }

    #[test]
    fn eta_rejects_non_positive_speed() {
        assert_eq!(eta_minutes(1.0, 0.0), None);
        assert_eq!(eta_minutes(1.0, -5.0), None);
        assert_eq!(eta_minutes(1.0, f64::NAN), None);
        assert_eq!(eta_minutes(1.0, f64::INFINITY), None);
    }

    #[test]
    fn eta_rejects_bad_distance() {
        assert_eq!(eta_minutes(-1.0, 20.0), None);
        assert_eq!(eta_minutes(f64::NAN, 20.0), None);
    }

    #[test]
    fn eta_rounds_to_nearest_minute() {
        assert_eq!(eta_minutes(1.0, 20.0), Some(3));
        assert_eq!(eta_minutes(1.2, 20.0), Some(4));
        assert_eq!(eta_minutes(0.1, 20.0), Some(0));
    }

    #[test]
    fn bearing_cardinal_directions() {
        assert!((bearing_deg(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((bearing_deg(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((bearing_deg(1.0, 0.0, 0.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((bearing_deg(0.0, 1.0, 0.0, 0.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn coordinate_validation() {
        assert!(is_valid_coordinate(90.0, 180.0));
        assert!(is_valid_coordinate(-90.0, -180.0));
        assert!(!is_valid_coordinate(90.01, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.01));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(0.0, f64::INFINITY));
    }

    #[test]
    fn round_km_two_places() {
        assert!((round_km(1.11195) - 1.11).abs() < 1e-12);
        assert!((round_km(3.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn proximity_bands() {
        assert_eq!(ProximityBand::classify(0.0), ProximityBand::Approaching);
        assert_eq!(ProximityBand::classify(0.2), ProximityBand::Approaching);
        assert_eq!(ProximityBand::classify(0.3), ProximityBand::Nearby);
        assert_eq!(ProximityBand::classify(0.5), ProximityBand::Nearby);
        assert_eq!(ProximityBand::classify(0.51), ProximityBand::Far);
    }

    #[test]
    fn bounding_box_edges_inclusive() {
        let b = BoundingBox {
            north: 1.0,
            south: -1.0,
            east: 1.0,
            west: -1.0,
        };
        assert!(b.contains(1.0, -1.0));
        assert!(!b.contains(1.01, 0.0));
        assert!(!b.contains(0.0, 1.01));
    }

    #[test]
    fn nearest_sorts_and_limits() {
        let far = Coordinate::new(14.70, 120.98);
        let near = Coordinate::new(14.61, 120.98);
        let mid = Coordinate::new(14.65, 120.98);
        let ranked = nearest(MANILA, vec![far, near, mid], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].item, near);
        assert_eq!(ranked[1].item, mid);
    }

    #[test]
    fn nearest_ties_keep_input_order() {
        #[derive(Debug, PartialEq)]
        struct Tagged(&'static str, Coordinate);
        impl Located for Tagged {
            fn coordinate(&self) -> Coordinate {
                self.1
            }
        }

        let p = Coordinate::new(14.61, 120.98);
        let items = vec![Tagged("a", p), Tagged("b", p), Tagged("c", p)];
        let ranked = nearest(MANILA, items, 10);
        let tags: Vec<_> = ranked.iter().map(|r| r.item.0).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn nearest_empty_input() {
        let ranked = nearest::<Coordinate, _>(MANILA, Vec::new(), 5);
        assert!(ranked.is_empty());
    }

    #[test]
    fn nearest_zero_limit() {
        let ranked = nearest(MANILA, vec![MANILA], 0);
        assert!(ranked.is_empty());
    }

    fn lat() -> impl Strategy<Value = f64> {
        -90.0..=90.0f64
    }

    fn lon() -> impl Strategy<Value = f64> {
        -180.0..=180.0f64
    }

    proptest! {
        #[test]
        fn distance_to_self_is_zero(a in lat(), b in lon()) {
            prop_assert!(distance_km(a, b, a, b).abs() < 1e-9);
        }

        #[test]
        fn distance_is_symmetric(a in lat(), b in lon(), c in lat(), d in lon()) {
            let ab = distance_km(a, b, c, d);
            let ba = distance_km(c, d, a, b);
            prop_assert!((ab - ba).abs() < 1e-6);
        }

        #[test]
        fn distance_is_bounded(a in lat(), b in lon(), c in lat(), d in lon()) {
            let dist = distance_km(a, b, c, d);
            prop_assert!(dist >= 0.0);
            prop_assert!(dist <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
        }

        #[test]
        fn triangle_inequality(
            a in lat(), b in lon(), c in lat(), d in lon(), e in lat(), f in lon()
        ) {
            let direct = distance_km(a, b, e, f);
            let via = distance_km(a, b, c, d) + distance_km(c, d, e, f);
            prop_assert!(direct <= via + 1e-3);
        }

        #[test]
        fn bearing_in_range(a in lat(), b in lon(), c in lat(), d in lon()) {
            let brg = bearing_deg(a, b, c, d);
            prop_assert!((0.0..360.0).contains(&brg));
        }
    }
}
