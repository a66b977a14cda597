//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or validating relay settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
    /// The merged settings do not fit the settings types.
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value the relay cannot run with.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted camelCase key, as written in the settings file.
        field: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

impl SettingsError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }

    /// The offending key for validation errors.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_names_the_file() {
        let err = SettingsError::Read {
            path: PathBuf::from("/etc/transit/settings.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            err.to_string(),
            "failed to read settings file /etc/transit/settings.json: denied"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_display_and_field() {
        let err = SettingsError::invalid("presence.staleThresholdMs", "must be greater than 0");
        assert_eq!(
            err.to_string(),
            "invalid setting presence.staleThresholdMs: must be greater than 0"
        );
        assert_eq!(err.field(), Some("presence.staleThresholdMs"));
    }

    #[test]
    fn shape_error_has_no_field() {
        let json_err = serde_json::from_str::<u16>("\"port\"").unwrap_err();
        let err = SettingsError::from(json_err);
        assert!(err.to_string().starts_with("settings do not match"));
        assert_eq!(err.field(), None);
    }
}
