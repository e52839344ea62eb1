//! Request broker
//!
//! Ties the executor registry, per-executor queues, the pending call table
//! and the routing policy together. Both surfaces (HTTP bridge and stdio
//! front) talk to the broker only through [`Broker`].

mod error;
mod events;
mod pending;
mod queue;
mod registry;
mod routing;
mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hostbridge_protocol::{
    ClientId, ExecutorKind, PushAck, PushPayload, RegisterResponse, RequestId, StatusResponse,
    ToolCallRequest, BRIDGE_PROTOCOL_VERSION,
};

pub use error::BrokerError;
pub use events::{EventHub, ExecutorEvent};
pub use pending::{CallOutcome, FrontId, PendingCall, PendingCallTable};
pub use registry::{ClientRegistry, Registration};
pub use routing::RoutingPolicy;
pub use sweeper::spawn_sweeper;

use crate::config::AppConfig;

/// Server version reported by `/register` and `/status`
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Enqueue attempts before a request whose targets keep closing is failed
const MAX_DISPATCH_ATTEMPTS: usize = 3;

/// Broker timing settings
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub secondary_marker: String,
    pub inactivity_timeout: Duration,
    pub long_poll: Duration,
    pub pull_recheck: Duration,
}

impl BrokerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            secondary_marker: config.routing.secondary_marker.clone(),
            inactivity_timeout: config.broker.inactivity_timeout(),
            long_poll: config.bridge.long_poll(),
            pull_recheck: config.bridge.pull_recheck(),
        }
    }
}

/// Counts from one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_clients: usize,
    /// Orphaned requests moved to another executor
    pub requeued: usize,
    /// Orphaned requests failed for lack of an executor
    pub failed: usize,
    pub expired_calls: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

struct BrokerInner {
    registry: ClientRegistry,
    pending: Arc<PendingCallTable>,
    routing: RoutingPolicy,
    events: EventHub,
    settings: BrokerSettings,
}

/// Shared handle to the broker state
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    pub fn new(settings: BrokerSettings, routing: RoutingPolicy, event_buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                registry: ClientRegistry::new(),
                pending: Arc::new(PendingCallTable::new()),
                routing,
                events: EventHub::new(event_buffer_size),
                settings,
            }),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            BrokerSettings::from_config(config),
            RoutingPolicy::new(&config.routing, config.broker.default_call_timeout()),
            config.broker.event_buffer_size,
        )
    }

    pub fn routing(&self) -> &RoutingPolicy {
        &self.inner.routing
    }

    // ==================== Executor side ====================

    /// Register an executor, superseding any live one of the same kind
    pub fn register(&self, plugin_version: &str) -> RegisterResponse {
        let kind =
            ExecutorKind::from_plugin_version(plugin_version, &self.inner.settings.secondary_marker);
        let version = if plugin_version.is_empty() {
            "unknown"
        } else {
            plugin_version
        };

        let Registration { client, superseded } = self.inner.registry.register(kind, version);
        info!(client_id = %client.id(), kind = %kind, plugin_version = %version, "Executor registered");

        if let Some(old) = superseded {
            let orphans = old.queue().close();
            info!(client_id = %old.id(), orphans = orphans.len(), "Previous executor superseded");
            self.requeue(orphans);
        }

        RegisterResponse {
            client_id: client.id(),
            kind,
            server_version: SERVER_VERSION.to_string(),
            protocol_version: BRIDGE_PROTOCOL_VERSION,
        }
    }

    /// Long-poll for queued requests
    ///
    /// Returns as soon as the queue is non-empty, or an empty batch once the
    /// long-poll window passes. The client's activity is refreshed on every
    /// re-check, so a waiting executor never looks idle.
    pub async fn pull(&self, client_id: ClientId) -> Result<Vec<ToolCallRequest>, BrokerError> {
        let deadline = Instant::now() + self.inner.settings.long_poll;
        loop {
            let client = self.inner.registry.touch(client_id)?;
            let batch = client.queue().drain_all();
            if !batch.is_empty() {
                debug!(client_id = %client_id, count = batch.len(), "Delivering requests");
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wait = (deadline - now).min(self.inner.settings.pull_recheck);
            client.queue().wait(wait).await;
        }
    }

    /// Accept responses and events from an executor
    ///
    /// A stale or unknown client is rejected as a whole; nothing in the
    /// payload is applied.
    pub fn push(&self, client_id: ClientId, payload: PushPayload) -> Result<PushAck, BrokerError> {
        let client = self.inner.registry.touch(client_id)?;
        let mut ack = PushAck {
            ok: true,
            ..PushAck::default()
        };

        for response in payload.responses {
            match self.inner.pending.resolve(response.normalized()) {
                Ok(()) => ack.resolved += 1,
                Err(err) => {
                    debug!(client_id = %client_id, code = err.code(), "Response not matched");
                    ack.discarded += 1;
                }
            }
        }

        for event in payload.events {
            self.inner.events.publish(client.id(), event);
            ack.events += 1;
        }

        debug!(
            client_id = %client_id,
            resolved = ack.resolved,
            discarded = ack.discarded,
            events = ack.events,
            "Push accepted"
        );
        Ok(ack)
    }

    // ==================== Front side ====================

    /// Route and enqueue a tool call, returning the handle to wait on
    ///
    /// Fails immediately with [`BrokerError::NoClientConnected`] when no
    /// executor is live; nothing is left pending in that case.
    pub fn submit(
        &self,
        owner: FrontId,
        tool_name: &str,
        arguments: Value,
    ) -> Result<PendingCall, BrokerError> {
        self.inner.routing.route(tool_name, &self.inner.registry)?;

        let request = ToolCallRequest::new(tool_name, arguments);
        let request_id = request.request_id;
        let timeout = self.inner.routing.timeout_for(tool_name);
        // Registered before enqueue so a fast response always finds its waiter
        let call = self
            .inner
            .pending
            .register(request_id, tool_name, owner, timeout)?;

        let target = self.dispatch(request)?;
        debug!(
            request_id = %request_id,
            tool = %tool_name,
            client_id = %target,
            timeout_secs = timeout.as_secs(),
            "Tool call queued"
        );
        Ok(call)
    }

    /// Cancel one pending call
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        self.inner.pending.cancel(request_id)
    }

    /// Cancel every pending call owned by a front session
    pub fn cancel_owner(&self, owner: FrontId) -> usize {
        self.inner.pending.cancel_owner(owner)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.inner.events.subscribe()
    }

    pub fn recent_events(&self, since: u64, limit: usize) -> Vec<ExecutorEvent> {
        self.inner.events.recent(since, limit)
    }

    // ==================== Maintenance ====================

    /// Expire idle executors and overdue calls
    pub fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        let expired = self
            .inner
            .registry
            .expire_stale(now, self.inner.settings.inactivity_timeout);
        for client in expired {
            report.expired_clients += 1;
            let orphans = client.queue().close();
            warn!(
                client_id = %client.id(),
                kind = %client.kind(),
                idle_secs = client.idle_for(now).as_secs(),
                orphans = orphans.len(),
                "Executor expired"
            );
            let (requeued, failed) = self.requeue(orphans);
            report.requeued += requeued;
            report.failed += failed;
        }

        report.expired_calls = self.inner.pending.expire_overdue(now);
        report
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            server_version: SERVER_VERSION.to_string(),
            clients: self.inner.registry.snapshot(Instant::now()),
            pending_calls: self.inner.pending.len(),
            event_buffer_size: self.inner.events.len(),
        }
    }

    // ==================== Internal ====================

    /// Enqueue on the routed client, rerouting if its queue closed meanwhile
    fn dispatch(&self, mut request: ToolCallRequest) -> Result<ClientId, BrokerError> {
        for _ in 0..MAX_DISPATCH_ATTEMPTS {
            let target = self
                .inner
                .routing
                .route(&request.tool_name, &self.inner.registry)?;
            match target.queue().enqueue(request) {
                Ok(_) => return Ok(target.id()),
                Err(returned) => {
                    debug!(client_id = %target.id(), "Queue closed during dispatch, rerouting");
                    request = returned;
                }
            }
        }
        Err(BrokerError::NoClientConnected {
            tool: request.tool_name,
        })
    }

    /// Move orphaned requests to whichever executor now serves them
    ///
    /// Returns `(requeued, failed)`. Requests whose waiter is gone are dropped.
    fn requeue(&self, orphans: Vec<ToolCallRequest>) -> (usize, usize) {
        let mut requeued = 0;
        let mut failed = 0;

        for request in orphans {
            let request_id = request.request_id;
            if !self.inner.pending.contains(&request_id) {
                continue;
            }
            match self.dispatch(request) {
                Ok(target) => {
                    debug!(request_id = %request_id, client_id = %target, "Orphaned request rerouted");
                    requeued += 1;
                }
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "Orphaned request failed");
                    self.inner.pending.fail(&request_id, err);
                    failed += 1;
                }
            }
        }

        (requeued, failed)
    }
}
