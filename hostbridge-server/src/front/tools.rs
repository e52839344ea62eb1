//! MCP tool catalog and result translation
//!
//! Two tools are answered locally; every other tool call is forwarded to an
//! executor through the broker.

use serde::Deserialize;
use serde_json::{json, Value};

use super::error::McpError;
use super::protocol::{Tool, ToolResult};
use crate::broker::{Broker, BrokerError, CallOutcome, RoutingPolicy};

/// Connection and queue snapshot, answered locally
pub const STATUS_TOOL: &str = "bridge_status";

/// Recent executor events, answered locally
pub const RECENT_EVENTS_TOOL: &str = "bridge_recent_events";

const DEFAULT_EVENT_LIMIT: usize = 50;
const MAX_EVENT_LIMIT: usize = 500;

/// Get all tool definitions: local tools, then configured routes by name
pub fn get_tool_definitions(routing: &RoutingPolicy) -> Vec<Tool> {
    let mut tools = local_tool_definitions();
    tools.extend(
        routing
            .routes()
            .filter(|(name, _)| !is_local_tool(name))
            .map(|(name, route)| Tool {
                name: name.to_string(),
                description: route.description.clone().unwrap_or_else(|| {
                    format!("Runs on the {} executor", routing.preferred_kind(name))
                }),
                input_schema: route.input_schema.clone().unwrap_or_else(|| {
                    json!({
                        "type": "object",
                        "additionalProperties": true
                    })
                }),
            }),
    );
    tools
}

fn local_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: STATUS_TOOL.into(),
            description: "Show connected executors, their queue depths and the number of pending calls".into(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: RECENT_EVENTS_TOOL.into(),
            description: "List recent events pushed by executors (logs, state changes)".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "since_seq": {
                        "type": "integer",
                        "description": "Only return events with a sequence number above this (default: 0)"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum number of events, newest kept (default: 50, max: 500)"
                    }
                }
            }),
        },
    ]
}

pub fn is_local_tool(name: &str) -> bool {
    name == STATUS_TOOL || name == RECENT_EVENTS_TOOL
}

#[derive(Debug, Deserialize)]
struct RecentEventsArgs {
    #[serde(default)]
    since_seq: u64,
    #[serde(default)]
    limit: Option<usize>,
}

/// Answer a local tool; `None` when `name` is not local
pub fn call_local_tool(
    broker: &Broker,
    name: &str,
    arguments: &Value,
) -> Option<Result<ToolResult, McpError>> {
    match name {
        STATUS_TOOL => Some(pretty_result(&broker.status())),
        RECENT_EVENTS_TOOL => Some(recent_events(broker, arguments)),
        _ => None,
    }
}

fn recent_events(broker: &Broker, arguments: &Value) -> Result<ToolResult, McpError> {
    let args: RecentEventsArgs = if arguments.is_null() {
        RecentEventsArgs {
            since_seq: 0,
            limit: None,
        }
    } else {
        serde_json::from_value(arguments.clone())
            .map_err(|e| McpError::InvalidParams(format!("{}: {}", RECENT_EVENTS_TOOL, e)))?
    };
    let limit = args.limit.unwrap_or(DEFAULT_EVENT_LIMIT).min(MAX_EVENT_LIMIT);

    pretty_result(&broker.recent_events(args.since_seq, limit))
}

fn pretty_result<T: serde::Serialize>(value: &T) -> Result<ToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)?;
    Ok(ToolResult::text(text))
}

/// Translate a forwarded call's outcome into an MCP tool result
pub fn outcome_to_result(outcome: CallOutcome) -> ToolResult {
    match outcome {
        Ok(response) if response.success => ToolResult::text(success_text(response.result)),
        Ok(response) => ToolResult::error(
            response
                .error
                .unwrap_or_else(|| "Unknown executor error".to_string()),
        ),
        Err(err) => broker_error_result(&err),
    }
}

/// Tool result for a broker-originated failure
pub fn broker_error_result(err: &BrokerError) -> ToolResult {
    let message = err.to_string();
    ToolResult::error(message.clone()).with_structured(json!({
        "error": {
            "code": err.code(),
            "message": message,
        }
    }))
}

fn success_text(result: Option<Value>) -> String {
    match result {
        None | Some(Value::Null) => "ok".to_string(),
        Some(Value::String(text)) => text,
        Some(other) => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ToolRoute};
    use crate::front::protocol::ToolContent;
    use hostbridge_protocol::{BridgeEvent, PushPayload, RequestId, ToolCallResponse};
    use std::time::Duration;

    fn text_of(result: &ToolResult) -> &str {
        match &result.content[0] {
            ToolContent::Text { text } => text,
        }
    }

    // ==================== Catalog Tests ====================

    #[test]
    fn test_catalog_lists_local_and_routed_tools() {
        let mut config = AppConfig::default();
        config.routing.tools.insert(
            "inspect".into(),
            ToolRoute {
                kind: Some(hostbridge_protocol::ExecutorKind::Secondary),
                ..ToolRoute::default()
            },
        );
        config
            .routing
            .tools
            .insert(STATUS_TOOL.into(), ToolRoute::default());
        let broker = Broker::from_config(&config);

        let tools = get_tool_definitions(broker.routing());
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![STATUS_TOOL, RECENT_EVENTS_TOOL, "inspect", "run_script"]
        );

        let inspect = &tools[2];
        assert_eq!(inspect.description, "Runs on the secondary executor");
        assert_eq!(inspect.input_schema["type"], "object");
        assert_eq!(tools[3].description, "Run a script inside the host application");
    }

    #[test]
    fn test_all_tools_have_valid_schemas() {
        let broker = Broker::from_config(&AppConfig::default());
        for tool in get_tool_definitions(broker.routing()) {
            assert!(!tool.description.is_empty(), "{} has no description", tool.name);
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        }
    }

    // ==================== Translation Tests ====================

    #[test]
    fn test_success_text_forms() {
        let id = RequestId::new();
        let result = outcome_to_result(Ok(ToolCallResponse::success(id, json!("hello"))));
        assert_eq!(text_of(&result), "hello");
        assert!(result.is_error.is_none());

        let result = outcome_to_result(Ok(ToolCallResponse::success(id, json!({"a": 1}))));
        assert_eq!(text_of(&result), "{\n  \"a\": 1\n}");

        let result = outcome_to_result(Ok(ToolCallResponse::success(id, json!(42))));
        assert_eq!(text_of(&result), "42");

        let mut empty = ToolCallResponse::success(id, Value::Null);
        empty.result = None;
        assert_eq!(text_of(&outcome_to_result(Ok(empty))), "ok");
    }

    #[test]
    fn test_executor_error_passes_through() {
        let result = outcome_to_result(Ok(ToolCallResponse::failure(
            RequestId::new(),
            "attempt to index nil",
        )));
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text_of(&result), "attempt to index nil");
        assert!(result.structured_content.is_none());
    }

    #[test]
    fn test_broker_error_is_structured() {
        let result = outcome_to_result(Err(BrokerError::CallTimeout {
            tool: "run_script".into(),
            after: Duration::from_secs(30),
        }));
        assert_eq!(result.is_error, Some(true));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["error"]["code"], "call_timeout");
        assert!(structured["error"]["message"]
            .as_str()
            .unwrap()
            .contains("30s"));
    }

    // ==================== Local Tool Tests ====================

    #[test]
    fn test_status_tool() {
        let broker = Broker::from_config(&AppConfig::default());
        broker.register("1.0");

        let result = call_local_tool(&broker, STATUS_TOOL, &json!({}))
            .unwrap()
            .unwrap();
        let parsed: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(parsed["clients"][0]["kind"], "primary");
        assert_eq!(parsed["pending_calls"], 0);
    }

    #[test]
    fn test_recent_events_tool() {
        let broker = Broker::from_config(&AppConfig::default());
        let reg = broker.register("1.0");
        let events = (0..3)
            .map(|i| BridgeEvent {
                event_type: "log".into(),
                data: json!(i),
            })
            .collect();
        broker
            .push(
                reg.client_id,
                PushPayload {
                    responses: Vec::new(),
                    events,
                },
            )
            .unwrap();

        let result = call_local_tool(&broker, RECENT_EVENTS_TOOL, &json!({"since_seq": 1, "limit": 1}))
            .unwrap()
            .unwrap();
        let parsed: Value = serde_json::from_str(text_of(&result)).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["seq"], 3);
        assert_eq!(parsed[0]["data"], 2);
    }

    #[test]
    fn test_recent_events_bad_args() {
        let broker = Broker::from_config(&AppConfig::default());
        let result = call_local_tool(&broker, RECENT_EVENTS_TOOL, &json!({"limit": "many"})).unwrap();
        assert!(matches!(result, Err(McpError::InvalidParams(_))));
    }

    #[test]
    fn test_non_local_tool() {
        let broker = Broker::from_config(&AppConfig::default());
        assert!(call_local_tool(&broker, "run_script", &json!({})).is_none());
    }
}
