//! Mesh message routing
//!
//! The default application handler installed by the server binary. In mesh
//! mode the server only relays: a `ready` registers the sender and
//! broadcasts the room roster, a `signal` is forwarded to the addressed
//! peer with the sender's id stamped in, and any other type is broadcast to
//! the room. Signaling payloads are validated at the endpoints, not here.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::message::{Message, MESSAGE_TYPE_ROOM_JOIN, MESSAGE_TYPE_ROOM_LEAVE};
use crate::ws::{MessageHandler, RoomEvent};
use std::sync::Arc;

/// Inbound `signal` payload: the target peer and the signal to forward
#[derive(Debug, Deserialize)]
struct SignalEnvelope {
    #[serde(rename = "userID")]
    user_id: String,
    signal: Value,
}

/// Inbound `ready` payload
#[derive(Debug, Default, Deserialize)]
struct ReadyEnvelope {
    #[serde(default)]
    nickname: Option<String>,
}

/// Build the mesh-mode message handler.
pub fn mesh_message_handler() -> MessageHandler {
    Arc::new(|event: RoomEvent| {
        Box::pin(handle_room_event(event)) as futures::future::BoxFuture<'static, ()>
    })
}

async fn handle_room_event(event: RoomEvent) {
    match event.message.typ.as_str() {
        "ready" => handle_ready(&event).await,
        "signal" => handle_signal(&event).await,
        // Adapter-originated notifications are outbound only.
        MESSAGE_TYPE_ROOM_JOIN | MESSAGE_TYPE_ROOM_LEAVE => {}
        _ => {
            if let Err(e) = event.adapter.broadcast(event.message.clone()).await {
                warn!(
                    room = %event.room,
                    client_id = %event.client_id,
                    error = %e,
                    "Error broadcasting message"
                );
            }
        }
    }
}

async fn handle_ready(event: &RoomEvent) {
    let ready: ReadyEnvelope =
        serde_json::from_value(event.message.payload.clone()).unwrap_or_default();
    if let Some(nickname) = ready.nickname {
        event
            .adapter
            .set_metadata(&event.client_id, nickname)
            .await;
    }

    let clients = match event.adapter.clients().await {
        Ok(clients) => clients,
        Err(e) => {
            warn!(room = %event.room, error = %e, "Error reading room clients");
            return;
        }
    };

    let mut peer_ids: Vec<&String> = clients.keys().collect();
    peer_ids.sort();

    let users = Message::new(
        "users",
        &event.room,
        json!({
            "initiator": event.client_id,
            "peerIds": peer_ids,
            "nicknames": clients,
        }),
    );

    if let Err(e) = event.adapter.broadcast(users).await {
        warn!(room = %event.room, error = %e, "Error broadcasting users");
    }
}

async fn handle_signal(event: &RoomEvent) {
    let envelope: SignalEnvelope = match serde_json::from_value(event.message.payload.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                room = %event.room,
                client_id = %event.client_id,
                error = %e,
                "Malformed signal payload"
            );
            return;
        }
    };

    debug!(
        room = %event.room,
        from = %event.client_id,
        to = %envelope.user_id,
        "Relaying signal"
    );

    let forwarded = Message::new(
        "signal",
        &event.room,
        json!({
            "userID": event.client_id,
            "signal": envelope.signal,
        }),
    );

    if let Err(e) = event.adapter.emit(&envelope.user_id, forwarded).await {
        warn!(
            room = %event.room,
            from = %event.client_id,
            to = %envelope.user_id,
            error = %e,
            "Error relaying signal"
        );
    }
}
