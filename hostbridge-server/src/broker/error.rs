//! Broker error taxonomy

use std::time::Duration;

use hostbridge_protocol::{ClientId, RequestId};

/// Errors raised by the broker and its HTTP surface
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Missing or wrong bearer token
    #[error("Missing or invalid bearer token")]
    Auth,

    /// Operation referenced a stale or never-registered executor
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    /// Routing found no live executor of either kind
    #[error("No executor connected to handle '{tool}'")]
    NoClientConnected { tool: String },

    /// Deadline elapsed without a response
    #[error("Tool call '{tool}' timed out after {}s", .after.as_secs())]
    CallTimeout { tool: String, after: Duration },

    /// Late, repeated or unmatched response
    #[error("Duplicate or unknown response for request {0}")]
    DuplicateOrUnknownResponse(RequestId),

    /// A second waiter for a request id that is still pending
    #[error("Request {0} is already pending")]
    DuplicateRequest(RequestId),

    /// Body or query string violated the bridge schema
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The front cancelled the call or went away
    #[error("Tool call '{tool}' was cancelled")]
    Cancelled { tool: String },
}

impl BrokerError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Stable snake_case code used in JSON error bodies and tool results
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth => "auth_error",
            Self::UnknownClient(_) => "unknown_client",
            Self::NoClientConnected { .. } => "no_client_connected",
            Self::CallTimeout { .. } => "call_timeout",
            Self::DuplicateOrUnknownResponse(_) => "duplicate_or_unknown_response",
            Self::DuplicateRequest(_) => "duplicate_request",
            Self::MalformedRequest(_) => "malformed_request",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
