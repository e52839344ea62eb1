//! Bridge message bodies
//!
//! Every body is JSON. Field names are snake_case on the wire, except the
//! `clientId` query parameter, which the server handles itself.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ClientId, ExecutorKind, RequestId};

// ==================== Register ====================

/// Body of `POST /register`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Executor build identifier; also carries the kind marker
    #[serde(default)]
    pub plugin_version: String,
}

/// Reply to `POST /register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub client_id: ClientId,
    pub kind: ExecutorKind,
    pub server_version: String,
    pub protocol_version: u32,
}

// ==================== Tool calls ====================

/// A tool call waiting to be delivered to an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub request_id: RequestId,
    pub tool_name: String,
    pub arguments: Value,
    /// Unix timestamp in milliseconds
    pub created_at: u64,
}

impl ToolCallRequest {
    /// Create a request with a fresh id, stamped with the current time
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            request_id: RequestId::new(),
            tool_name: tool_name.into(),
            arguments,
            created_at: unix_millis(),
        }
    }
}

/// An executor's answer to one [`ToolCallRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub request_id: RequestId,
    pub success: bool,
    /// Present iff `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present iff not `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResponse {
    pub fn success(request_id: RequestId, result: Value) -> Self {
        Self {
            request_id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(request_id: RequestId, error: impl Into<String>) -> Self {
        Self {
            request_id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Enforce the success/result/error exclusivity
    ///
    /// Executors are not fully trusted to fill these in consistently: a
    /// failure without a message gets a generic one, and whichever field
    /// contradicts `success` is dropped.
    pub fn normalized(mut self) -> Self {
        if self.success {
            self.error = None;
        } else {
            self.result = None;
            if self.error.as_deref().map_or(true, str::is_empty) {
                self.error = Some("Unknown executor error".to_string());
            }
        }
        self
    }
}

// ==================== Push ====================

/// Fire-and-forget notification from an executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Body of `POST /push`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub responses: Vec<ToolCallResponse>,
    #[serde(default)]
    pub events: Vec<BridgeEvent>,
}

/// Reply to `POST /push`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushAck {
    pub ok: bool,
    /// Responses that completed a waiting call
    pub resolved: usize,
    /// Responses dropped as duplicate, late, unknown, or undecodable
    pub discarded: usize,
    /// Events accepted for fan-out
    pub events: usize,
}

// ==================== Status ====================

/// One registered executor as reported by `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStatus {
    pub client_id: ClientId,
    pub kind: ExecutorKind,
    pub plugin_version: String,
    /// RFC 3339 registration time
    pub registered_at: String,
    /// Seconds since the last pull or push
    pub idle_secs: u64,
    pub queue_depth: usize,
}

/// Reply to `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub server_version: String,
    pub clients: Vec<ClientStatus>,
    pub pending_calls: usize,
    pub event_buffer_size: usize,
}

// ==================== Errors ====================

/// JSON error body returned with every non-2xx bridge response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable snake_case error code
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
