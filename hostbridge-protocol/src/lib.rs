//! hostbridge-protocol: Shared definitions for the executor bridge
//!
//! This crate defines the JSON bodies exchanged between the hostbridge broker
//! and the executors that poll it over HTTP (`/register`, `/pull`, `/push`,
//! `/status`), plus the identifier and kind types both sides agree on.

pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use messages::{
    BridgeEvent, ClientStatus, ErrorBody, ErrorDetail, PushAck, PushPayload, RegisterRequest,
    RegisterResponse, StatusResponse, ToolCallRequest, ToolCallResponse,
};
pub use types::{ClientId, ExecutorKind, IdParseError, RequestId};

/// Current bridge protocol version, reported to executors on registration
pub const BRIDGE_PROTOCOL_VERSION: u32 = 1;
