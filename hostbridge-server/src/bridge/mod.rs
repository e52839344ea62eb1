//! Executor-facing HTTP bridge
//!
//! Plain HTTP/1.1 on a loopback address. Executors register, long-poll for
//! work on `/pull` and return results on `/push`.

mod auth;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::broker::Broker;

pub use handlers::handle_request;

/// State shared by every bridge connection
pub struct BridgeContext {
    pub broker: Broker,
    pub token: String,
    pub max_body_bytes: usize,
}

impl BridgeContext {
    pub fn new(broker: Broker, token: String, max_body_bytes: usize) -> Self {
        Self {
            broker,
            token,
            max_body_bytes,
        }
    }
}

/// Accept bridge connections until `shutdown_rx` fires
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<BridgeContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("Bridge listening on http://{}", addr),
        Err(e) => warn!("Bridge listening on unknown address: {}", e),
    }

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = match accept_result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Bridge accept error: {}", e);
                        continue;
                    }
                };
                serve_connection(stream, remote_addr, Arc::clone(&ctx));
            }

            _ = shutdown_rx.recv() => {
                info!("Bridge shutting down");
                break;
            }
        }
    }
}

fn serve_connection(stream: tokio::net::TcpStream, remote_addr: SocketAddr, ctx: Arc<BridgeContext>) {
    let io = TokioIo::new(stream);

    tokio::spawn(async move {
        let service = service_fn(move |req| {
            let ctx = Arc::clone(&ctx);
            async move { handle_request(req, ctx).await }
        });

        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
            // Executors routinely drop idle long-polls
            if !e.is_incomplete_message() {
                warn!("Bridge connection error from {}: {}", remote_addr, e);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serve_answers_health_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = Arc::new(BridgeContext::new(
            Broker::from_config(&AppConfig::default()),
            "t".to_string(),
            1024,
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(serve(listener, ctx, shutdown_rx));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("ok"));

        shutdown_tx.send(()).unwrap();
        server.await.unwrap();
    }
}
