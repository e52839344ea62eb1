//! Configuration schema structs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hostbridge_protocol::ExecutorKind;

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bridge: BridgeConfig,
    pub broker: BrokerConfig,
    pub routing: RoutingConfig,
    pub logging: LoggingConfig,
}

/// HTTP bridge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listen address; must be a loopback address
    pub host: String,
    pub port: u16,
    /// Shared bearer secret. Generated at startup when unset.
    pub token: Option<String>,
    /// Upper bound on a single `/pull` long-poll
    pub long_poll_secs: u64,
    /// How often a waiting `/pull` re-checks its queue and refreshes the client
    pub pull_recheck_ms: u64,
    /// Maximum accepted request body
    pub max_body_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3333,
            token: None,
            long_poll_secs: 25,
            pull_recheck_ms: 1000,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl BridgeConfig {
    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_secs)
    }

    pub fn pull_recheck(&self) -> Duration {
        Duration::from_millis(self.pull_recheck_ms)
    }
}

/// Broker timing and buffer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// An executor not seen for this long is expired
    pub inactivity_timeout_secs: u64,
    /// Interval of the background expiry sweep
    pub sweep_interval_secs: u64,
    /// Deadline for tool calls without a per-tool timeout
    pub default_call_timeout_secs: u64,
    /// Number of recent executor events kept for `bridge_recent_events`
    pub event_buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 60,
            sweep_interval_secs: 5,
            default_call_timeout_secs: 30,
            event_buffer_size: 500,
        }
    }
}

impl BrokerConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn default_call_timeout(&self) -> Duration {
        Duration::from_secs(self.default_call_timeout_secs)
    }
}

/// Tool routing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Substring of `plugin_version` that identifies a secondary executor
    pub secondary_marker: String,
    /// Kind preferred by tools without an explicit route
    pub default_kind: ExecutorKind,
    /// Per-tool routes, keyed by tool name
    pub tools: BTreeMap<String, ToolRoute>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut tools = BTreeMap::new();
        tools.insert(
            "run_script".to_string(),
            ToolRoute {
                kind: Some(ExecutorKind::Primary),
                description: Some("Run a script inside the host application".into()),
                ..ToolRoute::default()
            },
        );

        Self {
            secondary_marker: "session".into(),
            default_kind: ExecutorKind::Primary,
            tools,
        }
    }
}

/// Route for a single tool
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolRoute {
    /// Preferred executor kind; `routing.default_kind` when omitted
    pub kind: Option<ExecutorKind>,
    /// Call deadline override
    pub timeout_secs: Option<u64>,
    /// Description advertised in `tools/list`
    pub description: Option<String>,
    /// JSON Schema advertised in `tools/list`
    pub input_schema: Option<serde_json::Value>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "stderr", "file" or "both"
    pub output: String,
    /// tracing filter directive; `HOSTBRIDGE_LOG` overrides it
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            output: "stderr".into(),
            filter: None,
        }
    }
}
