//! MCP error types

use std::io;

use super::protocol::JsonRpcError;

/// MCP front errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// IO error (stdin/stdout)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::MethodNotFound(method) => JsonRpcError::new(
                JsonRpcError::METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ),
            McpError::InvalidParams(msg) => JsonRpcError::new(JsonRpcError::INVALID_PARAMS, msg),
            McpError::Io(err) => {
                JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, format!("IO error: {}", err))
            }
            McpError::Json(err) => {
                JsonRpcError::new(JsonRpcError::PARSE_ERROR, format!("JSON error: {}", err))
            }
        }
    }
}
