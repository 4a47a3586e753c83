//! Wire message envelope and JSON codec
//!
//! Every frame on the socket and on the pub/sub bus is one serialized
//! [`Message`]: `{"type": ..., "room": ..., "payload": <any JSON>}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Error, Result};

/// Emitted by an adapter after a client is registered in a room.
pub const MESSAGE_TYPE_ROOM_JOIN: &str = "ws_room_join";

/// Emitted by an adapter after a client is removed from a room.
pub const MESSAGE_TYPE_ROOM_LEAVE: &str = "ws_room_leave";

/// One frame on the wire: a typed envelope addressed to a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Message type; `ws_room_join` and `ws_room_leave` are reserved,
    /// everything else is application-defined (`signal`, `ready`, `users`).
    #[serde(rename = "type")]
    pub typ: String,

    /// Room the message belongs to
    pub room: String,

    /// Arbitrary JSON payload
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Create a message with an arbitrary payload
    pub fn new(typ: impl Into<String>, room: impl Into<String>, payload: Value) -> Self {
        Self {
            typ: typ.into(),
            room: room.into(),
            payload,
        }
    }

    /// Room join notification, payload `{clientID, metadata}`
    pub fn room_join(room: &str, client_id: &str, metadata: &str) -> Self {
        Self::new(
            MESSAGE_TYPE_ROOM_JOIN,
            room,
            json!({
                "clientID": client_id,
                "metadata": metadata,
            }),
        )
    }

    /// Room leave notification, payload is the leaving client id
    pub fn room_leave(room: &str, client_id: &str) -> Self {
        Self::new(MESSAGE_TYPE_ROOM_LEAVE, room, json!(client_id))
    }

    /// Serialize to a UTF-8 JSON frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::SerializationError(format!("Failed to serialize message: {}", e)))
    }

    /// Parse a frame back into a message
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::MalformedFrame(format!("Failed to deserialize message: {}", e)))
    }
}
