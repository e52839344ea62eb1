//! Executor client registry
//!
//! At most one live executor per [`ExecutorKind`]. Registering a new
//! executor of a kind supersedes the previous one; the caller closes the old
//! queue and reroutes whatever it still held.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use hostbridge_protocol::{ClientId, ClientStatus, ExecutorKind};

use super::error::BrokerError;
use super::queue::RequestQueue;

/// A registered executor
#[derive(Debug)]
pub struct ExecutorClient {
    id: ClientId,
    kind: ExecutorKind,
    plugin_version: String,
    registered_at: DateTime<Utc>,
    last_seen: Mutex<Instant>,
    queue: RequestQueue,
}

impl ExecutorClient {
    fn new(kind: ExecutorKind, plugin_version: String) -> Self {
        Self {
            id: ClientId::new(),
            kind,
            plugin_version,
            registered_at: Utc::now(),
            last_seen: Mutex::new(Instant::now()),
            queue: RequestQueue::new(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Record activity now
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last pull or push, as of `now`
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }

    fn status(&self, now: Instant) -> ClientStatus {
        ClientStatus {
            client_id: self.id,
            kind: self.kind,
            plugin_version: self.plugin_version.clone(),
            registered_at: self.registered_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            idle_secs: self.idle_for(now).as_secs(),
            queue_depth: self.queue.len(),
        }
    }
}

/// Outcome of [`ClientRegistry::register`]
#[derive(Debug)]
pub struct Registration {
    pub client: Arc<ExecutorClient>,
    /// Previous live client of the same kind, now removed
    pub superseded: Option<Arc<ExecutorClient>>,
}

/// Live executors keyed by kind
#[derive(Debug, Default)]
pub struct ClientRegistry {
    live: RwLock<HashMap<ExecutorKind, Arc<ExecutorClient>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh executor of `kind`, replacing any current one
    pub fn register(&self, kind: ExecutorKind, plugin_version: impl Into<String>) -> Registration {
        let client = Arc::new(ExecutorClient::new(kind, plugin_version.into()));
        let superseded = self.live.write().insert(kind, Arc::clone(&client));
        if let Some(old) = &superseded {
            debug!(old = %old.id(), new = %client.id(), kind = %kind, "Client superseded");
        }
        Registration { client, superseded }
    }

    /// Refresh a client's activity timestamp
    ///
    /// Fails with [`BrokerError::UnknownClient`] for stale or unknown ids.
    pub fn touch(&self, id: ClientId) -> Result<Arc<ExecutorClient>, BrokerError> {
        let client = self.get(id).ok_or(BrokerError::UnknownClient(id))?;
        client.touch();
        Ok(client)
    }

    /// Look up a live client by id
    pub fn get(&self, id: ClientId) -> Option<Arc<ExecutorClient>> {
        self.live
            .read()
            .values()
            .find(|client| client.id() == id)
            .cloned()
    }

    /// The live client of `kind`, if any
    pub fn live_client(&self, kind: ExecutorKind) -> Option<Arc<ExecutorClient>> {
        self.live.read().get(&kind).cloned()
    }

    /// Remove every client idle for longer than `window`
    pub fn expire_stale(&self, now: Instant, window: Duration) -> Vec<Arc<ExecutorClient>> {
        let mut live = self.live.write();
        let stale: Vec<ExecutorKind> = live
            .iter()
            .filter(|(_, client)| client.idle_for(now) > window)
            .map(|(kind, _)| *kind)
            .collect();

        stale.into_iter().filter_map(|kind| live.remove(&kind)).collect()
    }

    /// Status of every live client, primary first
    pub fn snapshot(&self, now: Instant) -> Vec<ClientStatus> {
        let live = self.live.read();
        ExecutorKind::ALL
            .iter()
            .filter_map(|kind| live.get(kind))
            .map(|client| client.status(now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Registration Tests ====================

    #[test]
    fn test_register_assigns_fresh_ids() {
        let registry = ClientRegistry::new();
        let a = registry.register(ExecutorKind::Primary, "1.0");
        let b = registry.register(ExecutorKind::Secondary, "1.0-session");

        assert_ne!(a.client.id(), b.client.id());
        assert!(a.superseded.is_none());
        assert!(b.superseded.is_none());
        assert_eq!(registry.snapshot(Instant::now()).len(), 2);
    }

    #[test]
    fn test_register_supersedes_same_kind() {
        let registry = ClientRegistry::new();
        let old = registry.register(ExecutorKind::Primary, "1.0").client;
        let reg = registry.register(ExecutorKind::Primary, "1.1");

        assert_eq!(reg.superseded.unwrap().id(), old.id());
        assert_eq!(registry.snapshot(Instant::now()).len(), 1);
        assert!(registry.get(old.id()).is_none());
        assert_eq!(
            registry.live_client(ExecutorKind::Primary).unwrap().id(),
            reg.client.id()
        );
    }

    #[test]
    fn test_touch_unknown_client() {
        let registry = ClientRegistry::new();
        let id = ClientId::new();
        assert_eq!(registry.touch(id).unwrap_err(), BrokerError::UnknownClient(id));
    }

    // ==================== Expiry Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_expire_stale_removes_idle_clients() {
        let registry = ClientRegistry::new();
        let primary = registry.register(ExecutorKind::Primary, "1.0").client;
        let secondary = registry.register(ExecutorKind::Secondary, "1.0-session").client;

        tokio::time::advance(Duration::from_secs(40)).await;
        registry.touch(secondary.id()).unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        let expired = registry.expire_stale(Instant::now(), Duration::from_secs(60));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), primary.id());
        assert!(registry.get(primary.id()).is_none());
        assert!(registry.get(secondary.id()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_after_expiry_fails() {
        let registry = ClientRegistry::new();
        let client = registry.register(ExecutorKind::Primary, "1.0").client;

        tokio::time::advance(Duration::from_secs(61)).await;
        registry.expire_stale(Instant::now(), Duration::from_secs(60));

        assert!(matches!(
            registry.touch(client.id()),
            Err(BrokerError::UnknownClient(_))
        ));
    }

    // ==================== Snapshot Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_idle_and_depth() {
        let registry = ClientRegistry::new();
        registry.register(ExecutorKind::Secondary, "2.0-session");
        let primary = registry.register(ExecutorKind::Primary, "2.0").client;
        primary
            .queue()
            .enqueue(hostbridge_protocol::ToolCallRequest::new(
                "run_script",
                serde_json::json!({}),
            ))
            .unwrap();

        tokio::time::advance(Duration::from_secs(7)).await;
        let snapshot = registry.snapshot(Instant::now());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].kind, ExecutorKind::Primary);
        assert_eq!(snapshot[0].queue_depth, 1);
        assert_eq!(snapshot[0].idle_secs, 7);
        assert_eq!(snapshot[1].plugin_version, "2.0-session");
        assert!(snapshot[0].registered_at.ends_with('Z'));
    }
}
