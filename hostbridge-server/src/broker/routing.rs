//! Tool routing policy

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use hostbridge_protocol::ExecutorKind;

use super::error::BrokerError;
use super::registry::{ClientRegistry, ExecutorClient};
use crate::config::{RoutingConfig, ToolRoute};

/// Decides which executor kind serves a tool, with fallback to the other kind
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    default_kind: ExecutorKind,
    default_timeout: Duration,
    routes: BTreeMap<String, ToolRoute>,
}

impl RoutingPolicy {
    pub fn new(config: &RoutingConfig, default_timeout: Duration) -> Self {
        Self {
            default_kind: config.default_kind,
            default_timeout,
            routes: config.tools.clone(),
        }
    }

    /// Kind that should serve `tool` when both are live
    pub fn preferred_kind(&self, tool: &str) -> ExecutorKind {
        self.routes
            .get(tool)
            .and_then(|route| route.kind)
            .unwrap_or(self.default_kind)
    }

    /// Deadline for a call to `tool`
    pub fn timeout_for(&self, tool: &str) -> Duration {
        self.routes
            .get(tool)
            .and_then(|route| route.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Configured tools, in name order
    pub fn routes(&self) -> impl Iterator<Item = (&str, &ToolRoute)> {
        self.routes.iter().map(|(name, route)| (name.as_str(), route))
    }

    /// Pick the live client for `tool`
    ///
    /// The preferred kind wins; otherwise the other kind; otherwise
    /// [`BrokerError::NoClientConnected`].
    pub fn route(
        &self,
        tool: &str,
        registry: &ClientRegistry,
    ) -> Result<Arc<ExecutorClient>, BrokerError> {
        let preferred = self.preferred_kind(tool);
        registry
            .live_client(preferred)
            .or_else(|| registry.live_client(preferred.other()))
            .ok_or_else(|| BrokerError::NoClientConnected {
                tool: tool.to_string(),
            })
    }
}
