//! hostbridge server - MCP stdio front plus executor HTTP bridge
//!
//! stdout carries JSON-RPC only; all diagnostics go to stderr or the log file.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use hostbridge_utils::{init_logging_with_config, HostBridgeError, LogConfig, LogOutput, Result};

mod bridge;
mod broker;
mod cli;
mod config;
mod front;

use bridge::BridgeContext;
use broker::{spawn_sweeper, Broker};
use cli::Args;
use config::{AppConfig, ConfigLoader};
use front::McpFront;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if args.print_default_config {
        print!("{}", config::DEFAULT_CONFIG_TOML.trim_start());
        return Ok(());
    }

    let mut app_config = ConfigLoader::load(args.config.as_deref())?;
    args.apply_overrides(&mut app_config);
    ConfigLoader::validate(&app_config)?;

    let output: LogOutput = app_config.logging.output.parse()?;
    init_logging_with_config(LogConfig::server(
        output,
        app_config.logging.filter.as_deref(),
    ))?;

    if let Some(generated) = config::ensure_token(&mut app_config) {
        // Shown once so the executor side can be configured
        eprintln!("hostbridge: no bridge token configured, generated one for this run:");
        eprintln!("hostbridge:   {}", generated);
        warn!("Using a generated bridge token; set bridge.token or HOSTBRIDGE_TOKEN to make it stable");
    }

    run(app_config).await
}

async fn run(app_config: AppConfig) -> Result<()> {
    let host: IpAddr = app_config
        .bridge
        .host
        .parse()
        .map_err(|_| HostBridgeError::config(format!("invalid bridge.host '{}'", app_config.bridge.host)))?;
    let addr = SocketAddr::new(host, app_config.bridge.port);
    let token = app_config
        .bridge
        .token
        .clone()
        .ok_or_else(|| HostBridgeError::internal("bridge token missing after startup"))?;

    let listener = TcpListener::bind(addr).await.map_err(|e| HostBridgeError::Bind {
        addr: addr.to_string(),
        source: e,
    })?;

    let broker = Broker::from_config(&app_config);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let ctx = Arc::new(BridgeContext::new(
        broker.clone(),
        token,
        app_config.bridge.max_body_bytes,
    ));
    let bridge_task = tokio::spawn(bridge::serve(listener, ctx, shutdown_tx.subscribe()));
    let sweeper_task = spawn_sweeper(
        broker.clone(),
        app_config.broker.sweep_interval(),
        shutdown_tx.subscribe(),
    );

    info!(
        version = broker::SERVER_VERSION,
        bridge = %addr,
        "hostbridge server started"
    );

    let front = McpFront::new(broker.clone());
    tokio::select! {
        result = front.run() => match result {
            Ok(()) => info!("stdin closed"),
            Err(e) => error!(error = %e, "MCP front failed"),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt");
            broker.cancel_owner(front.id());
        }
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = bridge_task.await {
        warn!(error = %e, "Bridge task failed");
    }
    if let Err(e) = sweeper_task.await {
        warn!(error = %e, "Sweeper task failed");
    }

    info!("hostbridge server stopped");
    Ok(())
}
