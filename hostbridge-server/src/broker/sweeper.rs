//! Background expiry sweep
//!
//! Periodically expires idle executors and overdue calls. The first sweep
//! runs one interval after start.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Broker;

/// Spawn the sweep loop; it exits when `shutdown_rx` fires or closes
pub fn spawn_sweeper(
    broker: Broker,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Sweeper started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let report = broker.sweep();
                    if !report.is_empty() {
                        debug!(
                            expired_clients = report.expired_clients,
                            requeued = report.requeued,
                            failed = report.failed,
                            expired_calls = report.expired_calls,
                            "Sweep finished"
                        );
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Sweeper shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_expires_idle_client() {
        let broker = Broker::from_config(&AppConfig::default());
        let registered = broker.register("1.0");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_sweeper(broker.clone(), Duration::from_secs(5), shutdown_rx);

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert!(broker.status().clients.is_empty());
        assert!(broker.push(registered.client_id, Default::default()).is_err());

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let broker = Broker::from_config(&AppConfig::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_sweeper(broker, Duration::from_secs(5), shutdown_rx);

        drop(shutdown_tx);
        handle.await.unwrap();
    }
}
