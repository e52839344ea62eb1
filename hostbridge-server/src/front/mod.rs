//! MCP front - tool calls from the agent over stdio
//!
//! Reads newline-delimited JSON-RPC from stdin and answers on stdout. Every
//! forwarded `tools/call` waits in its own task, and a single writer task owns
//! stdout, so a slow executor never blocks further input.

pub mod error;
pub mod protocol;
pub mod tools;


use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hostbridge_protocol::RequestId;

use crate::broker::{Broker, ExecutorEvent, FrontId};

use self::error::McpError;
use self::protocol::{
    InitializeResult, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ToolCallParams, ToolsListResult,
};
use self::tools::{broker_error_result, call_local_tool, get_tool_definitions, outcome_to_result};

/// Logger name on forwarded executor events
pub const EVENT_LOGGER: &str = "hostbridge.executor";

/// Process-wide counter for log correlation
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Serialized messages bound for the writer task
#[derive(Clone)]
struct Outbox(mpsc::UnboundedSender<String>);

impl Outbox {
    fn send<T: Serialize>(&self, message: &T) {
        match serde_json::to_string(message) {
            Ok(line) => {
                if self.0.send(line).is_err() {
                    debug!("Writer gone, dropping outbound message");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize outbound message"),
        }
    }
}

/// State shared by the read loop and its call tasks
struct Session {
    outbox: Outbox,
    /// JSON-RPC id (serialized) -> broker request id, for `notifications/cancelled`
    ///
    /// A reused id maps to its latest call; each task only removes its own entry.
    in_flight: Arc<DashMap<String, RequestId>>,
    initialized: Arc<AtomicBool>,
    calls: JoinSet<()>,
}

/// MCP front
///
/// One front per stdio connection. Its pending calls are cancelled when its
/// input closes.
pub struct McpFront {
    broker: Broker,
    id: FrontId,
}

impl McpFront {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker,
            id: FrontId::new(),
        }
    }

    pub fn id(&self) -> FrontId {
        self.id
    }

    /// Serve on the process's stdin and stdout
    pub async fn run(&self) -> Result<(), McpError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches EOF
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(writer, out_rx));

        let mut session = Session {
            outbox: Outbox(out_tx),
            in_flight: Arc::new(DashMap::new()),
            initialized: Arc::new(AtomicBool::new(false)),
            calls: JoinSet::new(),
        };

        let shutdown = CancellationToken::new();
        let forwarder = tokio::spawn(forward_events(
            self.broker.subscribe_events(),
            session.outbox.clone(),
            Arc::clone(&session.initialized),
            shutdown.clone(),
        ));

        info!(front_id = %self.id, "MCP front starting");

        let mut lines = BufReader::new(reader).lines();
        let result = loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break Ok(()),
                Err(e) => break Err(McpError::Io(e)),
            };
            while session.calls.try_join_next().is_some() {}

            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(&line, &mut session);
        };

        let cancelled = self.broker.cancel_owner(self.id);
        info!(front_id = %self.id, cancelled, "MCP front input closed");

        while session.calls.join_next().await.is_some() {}
        shutdown.cancel();
        if let Err(e) = forwarder.await {
            warn!(error = %e, "Event forwarder task failed");
        }

        drop(session);
        if let Err(e) = writer_task.await {
            warn!(error = %e, "Writer task failed");
        }

        info!(front_id = %self.id, "MCP front shutting down");
        result
    }

    fn handle_line(&self, line: &str, session: &mut Session) {
        let log_req_id = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        debug!(req_id = log_req_id, raw = %line, "Received raw JSON-RPC message");

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                error!(req_id = log_req_id, error = %e, "Failed to parse JSON-RPC message");
                let code = if e.is_syntax() || e.is_eof() {
                    JsonRpcError::PARSE_ERROR
                } else {
                    JsonRpcError::INVALID_REQUEST
                };
                session
                    .outbox
                    .send(&JsonRpcResponse::error(Value::Null, JsonRpcError::new(code, e.to_string())));
                return;
            }
        };

        debug!(
            req_id = log_req_id,
            method = %request.method,
            jsonrpc_id = ?request.id,
            "Incoming JSON-RPC message"
        );

        if request.jsonrpc != "2.0" {
            warn!(req_id = log_req_id, got_version = %request.jsonrpc, "Invalid JSON-RPC version");
            if !request.is_notification() {
                session.outbox.send(&JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::with_data(
                        JsonRpcError::INVALID_REQUEST,
                        "Invalid JSON-RPC version",
                        json!({"expected": "2.0", "got": request.jsonrpc}),
                    ),
                ));
            }
            return;
        }

        if request.method == "tools/call" && !request.is_notification() {
            self.handle_tools_call(request, session);
            return;
        }

        let is_notification = request.is_notification();
        let result: Result<Value, McpError> = match request.method.as_str() {
            "initialize" => serde_json::to_value(InitializeResult::default()).map_err(McpError::from),
            "initialized" | "notifications/initialized" => {
                session.initialized.store(true, Ordering::Release);
                Ok(json!({}))
            }
            "notifications/cancelled" => {
                self.handle_cancelled(&request.params, session);
                Ok(json!({}))
            }
            "ping" => Ok(json!({})),
            "tools/list" => serde_json::to_value(ToolsListResult {
                tools: get_tool_definitions(self.broker.routing()),
            })
            .map_err(McpError::from),
            _ => Err(McpError::MethodNotFound(request.method.clone())),
        };

        if is_notification {
            if let Err(e) = result {
                warn!(method = %request.method, error = %e, "Notification handling failed");
            }
            return;
        }

        let response = match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, e.into()),
        };
        session.outbox.send(&response);
    }

    fn handle_tools_call(&self, request: JsonRpcRequest, session: &mut Session) {
        let params: ToolCallParams = match serde_json::from_value(request.params.clone()) {
            Ok(params) => params,
            Err(e) => {
                let err = McpError::InvalidParams(format!("tools/call: {}", e));
                session
                    .outbox
                    .send(&JsonRpcResponse::error(request.id, err.into()));
                return;
            }
        };
        let arguments = params.arguments.unwrap_or_else(|| json!({}));

        if let Some(local) = call_local_tool(&self.broker, &params.name, &arguments) {
            let response = match local.and_then(|result| serde_json::to_value(result).map_err(McpError::from)) {
                Ok(value) => JsonRpcResponse::success(request.id, value),
                Err(e) => JsonRpcResponse::error(request.id, e.into()),
            };
            session.outbox.send(&response);
            return;
        }

        let call = match self.broker.submit(self.id, &params.name, arguments) {
            Ok(call) => call,
            Err(err) => {
                info!(tool = %params.name, code = err.code(), "Tool call rejected");
                send_tool_result(&session.outbox, request.id, broker_error_result(&err));
                return;
            }
        };

        let key = request.id.to_string();
        session.in_flight.insert(key.clone(), call.request_id());

        let outbox = session.outbox.clone();
        let in_flight = Arc::clone(&session.in_flight);
        let tool = params.name;
        session.calls.spawn(async move {
            let started = std::time::Instant::now();
            let request_id = call.request_id();
            let outcome = call.wait().await;
            in_flight.remove_if(&key, |_, current| *current == request_id);

            match &outcome {
                Ok(response) => info!(
                    request_id = %request_id,
                    tool = %tool,
                    success = response.success,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call completed"
                ),
                Err(err) => warn!(
                    request_id = %request_id,
                    tool = %tool,
                    code = err.code(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call failed"
                ),
            }
            send_tool_result(&outbox, request.id, outcome_to_result(outcome));
        });
    }

    fn handle_cancelled(&self, params: &Value, session: &Session) {
        let Some(id) = params.get("requestId") else {
            debug!("notifications/cancelled without requestId");
            return;
        };
        let key = id.to_string();
        match session.in_flight.remove(&key) {
            Some((_, request_id)) => {
                let cancelled = self.broker.cancel(&request_id);
                info!(jsonrpc_id = %key, request_id = %request_id, cancelled, "Cancellation requested");
            }
            None => debug!(jsonrpc_id = %key, "Cancellation for unknown or finished call"),
        }
    }
}

fn send_tool_result(outbox: &Outbox, id: Value, result: protocol::ToolResult) {
    match serde_json::to_value(result) {
        Ok(value) => outbox.send(&JsonRpcResponse::success(id, value)),
        Err(e) => outbox.send(&JsonRpcResponse::error(id, McpError::from(e).into())),
    }
}

/// Own the output stream; one line per message
async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        debug!(raw = %line, "Sending raw JSON-RPC message");
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(error = %e, "Failed to write to stdout");
            break;
        }
    }
}

/// Forward executor events as `notifications/message` once initialized
async fn forward_events(
    mut events: broadcast::Receiver<ExecutorEvent>,
    outbox: Outbox,
    initialized: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => {
                    if initialized.load(Ordering::Acquire) {
                        outbox.send(&event_notification(&event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn event_notification(event: &ExecutorEvent) -> JsonRpcNotification {
    JsonRpcNotification::new(
        "notifications/message",
        json!({
            "level": "info",
            "logger": EVENT_LOGGER,
            "data": {
                "seq": event.seq,
                "event_type": event.event_type,
                "origin_client_id": event.origin_client_id,
                "data": event.data,
            }
        }),
    )
}
