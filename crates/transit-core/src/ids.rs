//! Branded ID newtypes for type safety.
//!
//! Operators, vehicles, routes, and transport connections each get a distinct
//! newtype around `String`, so an operator ID can never be passed where a
//! vehicle ID is expected. IDs arriving from clients are checked with
//! [`is_well_formed_id`] before they reach any relay state.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest identifier accepted from a client.
pub const MAX_ID_LENGTH: usize = 128;

/// Whether `value` is an acceptable client-supplied identifier.
///
/// Accepts 1 to [`MAX_ID_LENGTH`] ASCII alphanumerics, `-` or `_`. UUIDs in
/// their hyphenated form qualify.
pub fn is_well_formed_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ID_LENGTH
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the wrapped value passes [`is_well_formed_id`].
            #[must_use]
            pub fn is_well_formed(&self) -> bool {
                is_well_formed_id(&self.0)
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identifier of an operator (the driver account broadcasting a vehicle).
    OperatorId
}

branded_id! {
    /// Identifier of a physical vehicle.
    VehicleId
}

branded_id! {
    /// Identifier of a transit route.
    RouteId
}

branded_id! {
    /// Identifier of a live transport connection. Opaque to clients.
    ConnectionId
}

impl ConnectionId {
    /// Create a new connection ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_well_formed() {
        assert!(is_well_formed_id("3f0b8a52-7c1e-4f7e-9a55-2d2c0b7f4a10"));
    }

    #[test]
    fn short_codes_are_well_formed() {
        assert!(is_well_formed_id("R1"));
        assert!(is_well_formed_id("PASIG_CUBAO"));
    }

    #[test]
    fn empty_id_is_rejected() {
        assert!(!is_well_formed_id(""));
    }

    #[test]
    fn whitespace_and_punctuation_rejected() {
        assert!(!is_well_formed_id("route 1"));
        assert!(!is_well_formed_id("route/1"));
        assert!(!is_well_formed_id("r1\n"));
        assert!(!is_well_formed_id("<script>"));
    }

    #[test]
    fn length_limit_enforced() {
        assert!(is_well_formed_id(&"a".repeat(MAX_ID_LENGTH)));
        assert!(!is_well_formed_id(&"a".repeat(MAX_ID_LENGTH + 1)));
    }

    #[test]
    fn connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.is_well_formed());
    }

    #[test]
    fn serde_is_transparent() {
        let id = RouteId::from("R1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"R1\"");
        let back: RouteId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_and_deref() {
        let id = VehicleId::from("V1");
        assert_eq!(id.to_string(), "V1");
        assert_eq!(&*id, "V1");
        assert_eq!(id.as_str(), "V1");
    }

    #[test]
    fn borrow_allows_str_lookup() {
        let mut map = std::collections::HashMap::new();
        let _ = map.insert(OperatorId::from("op"), 1);
        assert_eq!(map.get("op"), Some(&1));
    }
}
