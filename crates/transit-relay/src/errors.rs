//! Relay error types.

use thiserror::Error;
use transit_core::OperatorId;

/// Why an inbound event was not applied.
///
/// None of these are fatal: the event is logged and dropped and the
/// connection stays open.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The frame was malformed or a field failed validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// Latitude or longitude out of range.
    #[error("invalid coordinate: ({latitude}, {longitude})")]
    InvalidCoordinate {
        /// Rejected latitude.
        latitude: f64,
        /// Rejected longitude.
        longitude: f64,
    },
    /// No active session for this operator.
    #[error("unknown operator: {0}")]
    UnknownOperator(OperatorId),
    /// The relay worker has stopped.
    #[error("relay worker unavailable")]
    WorkerUnavailable,
}

impl RelayError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::InvalidCoordinate { .. } => "invalid_coordinate",
            Self::UnknownOperator(_) => "unknown_operator",
            Self::WorkerUnavailable => "worker_unavailable",
        }
    }

    /// Whether this is a payload validation failure (including coordinates).
    pub fn is_invalid_payload(&self) -> bool {
        matches!(self, Self::InvalidPayload(_) | Self::InvalidCoordinate { .. })
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

/// Errors writing to the location history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The database rejected the write.
    #[error("durable write failure: {0}")]
    DurableWriteFailure(#[from] rusqlite::Error),
    /// The blocking write task panicked or was cancelled.
    #[error("history task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_is_payload_subtype() {
        let err = RelayError::InvalidCoordinate {
            latitude: 91.0,
            longitude: 0.0,
        };
        assert!(err.is_invalid_payload());
        assert_eq!(err.kind(), "invalid_coordinate");
        assert!(!RelayError::UnknownOperator("op".into()).is_invalid_payload());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            RelayError::UnknownOperator("op-1".into()).to_string(),
            "unknown operator: op-1"
        );
        assert_eq!(
            RelayError::InvalidCoordinate {
                latitude: 91.0,
                longitude: 10.5
            }
            .to_string(),
            "invalid coordinate: (91, 10.5)"
        );
    }

    #[test]
    fn serde_error_maps_to_invalid_payload() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RelayError = json_err.into();
        assert!(matches!(err, RelayError::InvalidPayload(_)));
    }

    #[test]
    fn history_error_display() {
        let err = HistoryError::Task("join error".into());
        assert_eq!(err.to_string(), "history task failed: join error");
    }
}
