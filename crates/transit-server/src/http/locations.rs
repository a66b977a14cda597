//! `/api/locations` endpoints answered from the relay's live route index.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use metrics::counter;
use serde::Deserialize;
use tracing::debug;
use transit_core::{Coordinate, RouteId, SessionSnapshot};
use transit_relay::query::{self, EtaEstimate, NearbyVehicle};

use super::{ApiError, ApiResponse};
use crate::metrics::HTTP_QUERIES_TOTAL;
use crate::server::AppState;

/// Body of `POST /api/locations/nearest`.
#[derive(Clone, Debug, Deserialize)]
pub struct NearestRequest {
    /// Query point latitude.
    pub latitude: f64,
    /// Query point longitude.
    pub longitude: f64,
    /// Restrict to one route.
    #[serde(default)]
    pub route_id: Option<RouteId>,
    /// Maximum vehicles to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Body of `POST /api/locations/eta`.
#[derive(Clone, Debug, Deserialize)]
pub struct EtaRequest {
    /// Where the rider waits.
    pub origin: Coordinate,
    /// Where the rider is going.
    pub destination: Coordinate,
    /// Restrict to one route.
    #[serde(default)]
    pub route_id: Option<RouteId>,
}

/// GET /api/locations/live
pub async fn live_all(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<SessionSnapshot>>, ApiError> {
    counter!(HTTP_QUERIES_TOTAL, "endpoint" => "live").increment(1);
    let vehicles = state.relay.all_snapshots().await?;
    Ok(ApiResponse::list(vehicles))
}

/// GET /api/locations/live/route/{route_id}
pub async fn live_route(
    State(state): State<AppState>,
    Path(route_id): Path<RouteId>,
) -> Result<ApiResponse<Vec<SessionSnapshot>>, ApiError> {
    counter!(HTTP_QUERIES_TOTAL, "endpoint" => "live_route").increment(1);
    let route_id = checked_route(Some(route_id))?;
    let vehicles = state.relay.snapshots(route_id).await?;
    Ok(ApiResponse::list(vehicles))
}

/// POST /api/locations/nearest
pub async fn nearest(
    State(state): State<AppState>,
    payload: Result<Json<NearestRequest>, JsonRejection>,
) -> Result<ApiResponse<Vec<NearbyVehicle>>, ApiError> {
    counter!(HTTP_QUERIES_TOTAL, "endpoint" => "nearest").increment(1);
    let Json(req) = payload?;
    let origin = query::checked_point(req.latitude, req.longitude)?;
    let route_id = checked_route(req.route_id)?;
    let proximity = &state.config.proximity;
    let limit = query::effective_limit(req.limit, proximity.default_limit, proximity.max_limit);

    let vehicles = state.relay.snapshots(route_id).await?;
    debug!(candidates = vehicles.len(), limit, "nearest query");
    let ranked =
        query::nearest_vehicles(vehicles, origin, limit, proximity.average_speed_kph);
    Ok(ApiResponse::list(ranked))
}

/// POST /api/locations/eta
pub async fn eta(
    State(state): State<AppState>,
    payload: Result<Json<EtaRequest>, JsonRejection>,
) -> Result<ApiResponse<EtaEstimate>, ApiError> {
    counter!(HTTP_QUERIES_TOTAL, "endpoint" => "eta").increment(1);
    let Json(req) = payload?;
    let origin = query::checked_point(req.origin.latitude, req.origin.longitude)?;
    let destination =
        query::checked_point(req.destination.latitude, req.destination.longitude)?;
    let route_id = checked_route(req.route_id)?;
    let proximity = &state.config.proximity;

    let vehicles = state.relay.snapshots(route_id).await?;
    let estimate = query::estimate_eta(
        vehicles,
        origin,
        destination,
        proximity.default_limit,
        proximity.average_speed_kph,
    );
    Ok(ApiResponse::ok(estimate))
}

fn checked_route(route_id: Option<RouteId>) -> Result<Option<RouteId>, ApiError> {
    match route_id {
        Some(id) if !id.is_well_formed() => {
            Err(ApiError::BadRequest(format!("invalid route_id: {id}")))
        }
        other => Ok(other),
    }
}
