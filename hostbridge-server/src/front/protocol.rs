//! JSON-RPC and MCP protocol types
//!
//! Implements the JSON-RPC 2.0 message types used by the MCP protocol.

use serde::{Deserialize, Serialize};

/// MCP protocol revision this server speaks
pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";

/// JSON-RPC 2.0 request or notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID; null or absent for notifications
    #[serde(default)]
    pub id: serde_json::Value,
    /// Method name
    pub method: String,
    /// Method parameters (optional)
    #[serde(default)]
    pub params: serde_json::Value,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID that this response is for
    pub id: serde_json::Value,
    /// Result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 notification sent by the server
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Create a new JSON-RPC error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new JSON-RPC error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    // Standard JSON-RPC error codes
    /// Parse error: Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request: The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found: The method does not exist
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params: Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error: Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name (e.g., "run_script")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Parameters of `tools/call`
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<serde_json::Value>,
}

/// MCP Tool call result
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content blocks returned by the tool
    pub content: Vec<ToolContent>,
    /// Machine-readable companion to `content`
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
    /// Whether this result represents an error
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    /// Create a text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content: None,
            is_error: None,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: Some(true),
        }
    }

    pub fn with_structured(mut self, value: serde_json::Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

/// MCP Tool content types
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
    },
}

/// MCP Server capabilities
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tool capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Present because executor events arrive as log messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolsCapability {}),
            logging: Some(LoggingCapability {}),
        }
    }
}

/// Tool capability marker
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsCapability {}

/// Logging capability marker
#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// MCP Server information
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "hostbridge".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Initialize response
#[derive(Debug, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Server info
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo::default(),
        }
    }
}

/// Tools list response
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// Available tools
    pub tools: Vec<Tool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_rpc_request_deserialize() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {}
        }"#;

        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.jsonrpc, "2.0");
        assert_eq!(request.id, json!(1));
        assert!(!request.is_notification());
    }

    #[test]
    fn test_notification_without_id() {
        let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

        let request: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert!(request.is_notification());
        assert!(request.params.is_null());
    }

    #[test]
    fn test_json_rpc_response_error_omits_result() {
        let error = JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, "Method not found");
        let value = serde_json::to_value(JsonRpcResponse::error(json!(1), error)).unwrap();

        assert_eq!(value["error"]["code"], -32601);
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_tool_result_serialization() {
        let value = serde_json::to_value(
            ToolResult::error("nope").with_structured(json!({"error": {"code": "x"}})),
        )
        .unwrap();

        assert_eq!(value["isError"], true);
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["structuredContent"]["error"]["code"], "x");

        let value = serde_json::to_value(ToolResult::text("fine")).unwrap();
        assert!(value.get("isError").is_none());
        assert!(value.get("structuredContent").is_none());
    }

    #[test]
    fn test_initialize_result_serialization() {
        let json = serde_json::to_string(&InitializeResult::default()).unwrap();

        assert!(json.contains("protocolVersion"));
        assert!(json.contains(MCP_PROTOCOL_VERSION));
        assert!(json.contains("hostbridge"));
        assert!(json.contains("logging"));
    }

    #[test]
    fn test_tool_call_params() {
        let params: ToolCallParams =
            serde_json::from_value(json!({"name": "run_script"})).unwrap();
        assert_eq!(params.name, "run_script");
        assert!(params.arguments.is_none());
    }
}
