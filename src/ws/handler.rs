//! Socket handler: bridges one inbound socket to the room plane
//!
//! Accepts the WebSocket upgrade, resolves `(room, clientID)` from the URL
//! path (`/ws/<room>/<clientID>`), binds a client to the room's adapter and
//! pumps inbound frames into the caller's message handler. Teardown runs in
//! a fixed order on every exit path: cleanup callback, adapter remove, room
//! exit, client close, socket close.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{error, info, warn};

use crate::message::Message;
use crate::ws::adapter::RoomAdapter;
use crate::ws::client::Client;
use crate::ws::rooms::RoomManager;
use crate::ws::transport::{FrameTransport, WsTransport};
use crate::Error;

/// One inbound frame in the context of its session
pub struct RoomEvent {
    pub client_id: String,
    pub room: String,
    pub adapter: Arc<dyn RoomAdapter>,
    pub message: Message,
}

/// Passed to the cleanup callback before the client leaves the adapter, so
/// the callback can still address the room.
pub struct CleanupEvent {
    pub client_id: String,
    pub room: String,
    pub adapter: Arc<dyn RoomAdapter>,
}

/// Application message handler invoked once per inbound frame
pub type MessageHandler = Arc<dyn Fn(RoomEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Optional cleanup hook running first in the teardown sequence
pub type CleanupHandler = Arc<dyn Fn(CleanupEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Socket-to-room bridge shared by all connections of a server
pub struct RoomHandler {
    rooms: Arc<RoomManager>,
    handle_message: MessageHandler,
    cleanup: Option<CleanupHandler>,
}

impl RoomHandler {
    pub fn new(rooms: Arc<RoomManager>, handle_message: MessageHandler) -> Self {
        Self {
            rooms,
            handle_message,
            cleanup: None,
        }
    }

    pub fn with_cleanup(
        rooms: Arc<RoomManager>,
        handle_message: MessageHandler,
        cleanup: CleanupHandler,
    ) -> Self {
        Self {
            rooms,
            handle_message,
            cleanup: Some(cleanup),
        }
    }

    /// Serve one socket for its whole session lifetime.
    pub async fn handle_socket<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut path = String::new();
        let ws = match accept_hdr_async(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            Ok(resp)
        })
        .await
        {
            Ok(ws) => ws,
            Err(e) => {
                warn!(error = %e, "Error accepting websocket connection");
                return;
            }
        };

        let transport: Arc<dyn FrameTransport> = Arc::new(WsTransport::new(ws));

        let (room, client_id) = match parse_room_path(&path) {
            Some(parsed) => parsed,
            None => {
                warn!(path = %path, "Rejecting socket with malformed room path");
                transport.close().await;
                return;
            }
        };

        info!(room = %room, client_id = %client_id, "New websocket connection");

        let client = Arc::new(Client::with_id(Arc::clone(&transport), client_id.clone()));

        let adapter = match self.rooms.enter(&room).await {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(room = %room, client_id = %client_id, error = %e, "Error entering room");
                client.close().await;
                transport.close().await;
                return;
            }
        };

        if let Err(e) = adapter.add(Arc::clone(&client)).await {
            error!(room = %room, client_id = %client_id, error = %e, "Error adding client to room");
            self.rooms.exit(&room).await;
            client.close().await;
            transport.close().await;
            return;
        }

        let result = client
            .subscribe(|message| {
                let event = RoomEvent {
                    client_id: client_id.clone(),
                    room: room.clone(),
                    adapter: Arc::clone(&adapter),
                    message,
                };
                (self.handle_message)(event)
            })
            .await;

        match result {
            Ok(()) => {}
            // A local close mid-subscribe is part of orderly shutdown.
            Err(Error::Cancelled(_)) => {}
            Err(e) => {
                error!(room = %room, client_id = %client_id, error = %e, "Subscription error");
            }
        }

        if let Some(cleanup) = &self.cleanup {
            cleanup(CleanupEvent {
                client_id: client_id.clone(),
                room: room.clone(),
                adapter: Arc::clone(&adapter),
            })
            .await;
        }

        if let Err(e) = adapter.remove(&client_id).await {
            error!(room = %room, client_id = %client_id, error = %e, "Error removing client from adapter");
        }

        self.rooms.exit(&room).await;
        client.close().await;
        transport.close().await;
        info!(room = %room, client_id = %client_id, "Websocket connection closed");
    }
}

/// Parse `(room, clientID)` out of a request path: the last segment is the
/// client id and its parent the room, regardless of any mount prefix.
pub(crate) fn parse_room_path(path: &str) -> Option<(String, String)> {
    let path = path.split('?').next().unwrap_or(path);
    let mut segments = path.split('/').filter(|s| !s.is_empty()).rev();
    let client_id = segments.next()?;
    let room = segments.next()?;
    Some((room.to_string(), client_id.to_string()))
}
