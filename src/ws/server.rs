//! WebSocket accept loop
//!
//! Binds a TCP listener and serves every inbound connection with the shared
//! [`RoomHandler`], one task per socket. The returned handle exposes the
//! bound address (useful with port 0) and a graceful shutdown signal.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::ws::handler::RoomHandler;
use crate::Result;

/// WebSocket signaling server
pub struct WsServer {
    addr: SocketAddr,
    handler: Arc<RoomHandler>,
}

impl WsServer {
    pub fn new(addr: SocketAddr, handler: Arc<RoomHandler>) -> Self {
        Self { addr, handler }
    }

    /// Bind the listener and spawn the accept loop.
    pub async fn start(self) -> Result<WsServerHandle> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "WebSocket server listening");

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let handler = self.handler;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer_addr)) => {
                                info!(peer = %peer_addr, "Accepted connection");
                                let handler = Arc::clone(&handler);
                                tokio::spawn(async move {
                                    handler.handle_socket(stream).await;
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to accept connection");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("WebSocket server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(WsServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }
}

/// Handle for a running server
pub struct WsServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl WsServerHandle {
    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Established sessions run to completion on their own tasks.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }

    /// Wait for the accept loop to end on its own.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
