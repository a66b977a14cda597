//! # transit-core
//!
//! Foundation types shared by every transit relay crate.
//!
//! - Branded ID newtypes ([`ids`]) so operator, vehicle, route, and connection
//!   identifiers cannot be mixed up
//! - Great-circle distance, bearing, and ETA math ([`geo`])
//! - Location snapshots and fixes exchanged with clients ([`location`])
//! - `tracing` subscriber setup ([`logging`])
//! - Domain constants ([`constants`])

#![deny(unsafe_code)]

pub mod constants;
pub mod geo;
pub mod ids;
pub mod location;
pub mod logging;

pub use geo::{BoundingBox, Coordinate, ProximityBand};
pub use ids::{ConnectionId, OperatorId, RouteId, VehicleId};
pub use location::{PositionFix, SessionSnapshot};
