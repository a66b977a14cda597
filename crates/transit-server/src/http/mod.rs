//! HTTP endpoints: health and live location queries.
//!
//! Query responses share one envelope:
//! `{"success": bool, "data"?: ..., "count"?: n, "error"?: msg}`.

pub mod health;
pub mod locations;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use transit_relay::RelayError;

/// Response envelope for `/api` endpoints.
#[derive(Clone, Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Item count for list payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            count: None,
            error: None,
        }
    }

    /// Attach an item count.
    #[must_use]
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// Successful list response with its count.
    pub fn list(items: Vec<T>) -> Self {
        let count = items.len();
        Self::ok(items).with_count(count)
    }
}

impl ApiResponse<()> {
    /// Failure response.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            count: None,
            error: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Errors returned by `/api` handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or out-of-range request.
    #[error("{0}")]
    BadRequest(String),
    /// The relay worker is not running.
    #[error("relay unavailable")]
    Unavailable,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::WorkerUnavailable => Self::Unavailable,
            other => Self::BadRequest(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, ApiResponse::failure(self.to_string())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_sets_count() {
        let resp = ApiResponse::list(vec![1, 2, 3]);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["count"], 3);
        assert_eq!(json["data"].as_array().unwrap().len(), 3);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_omits_data() {
        let json = serde_json::to_value(ApiResponse::failure("bad")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "bad");
        assert!(json.get("data").is_none());
        assert!(json.get("count").is_none());
    }

    #[test]
    fn relay_errors_map_to_status() {
        let unavailable = ApiError::from(RelayError::WorkerUnavailable);
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let invalid = ApiError::from(RelayError::InvalidCoordinate {
            latitude: 91.0,
            longitude: 0.0,
        });
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }
}
