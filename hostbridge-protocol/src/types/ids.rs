//! Opaque identifiers for executors and tool-call requests

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when an identifier string is not a valid UUID
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} '{value}': {reason}")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
    pub reason: String,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self).map_err(|e| IdParseError {
                    kind: $label,
                    value: s.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    };
}

uuid_id!(
    /// Identity of a registered executor, generated on `/register`
    ClientId,
    "client id"
);

uuid_id!(
    /// Identity of a single tool call, unique for the life of the broker process
    RequestId,
    "request id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(ClientId::new(), ClientId::new());
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_client_id_parse() {
        let id = ClientId::new();
        let parsed: ClientId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_client_id_parse_invalid() {
        let err = "not-a-uuid".parse::<ClientId>().unwrap_err();
        assert_eq!(err.kind, "client id");
        assert!(err.to_string().contains("not-a-uuid"));
    }

    #[test]
    fn test_request_id_serializes_as_plain_string() {
        let id = RequestId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }
}
