//! WebRTC signaling and room fan-out server
//!
//! Core of a browser-based group video-calling service: clients hold one
//! WebSocket each, join named rooms, and exchange signaling envelopes (SDP
//! offers and answers, ICE candidates, renegotiation and transceiver
//! requests) with the other participants of their room.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Browser clients (one WebSocket per client)              │
//! │   ↓ /ws/<room>/<clientID>                                │
//! │  WsServer → RoomHandler                                  │
//! │   ├─ Client (write queue + subscribe pump)               │
//! │   ├─ RoomManager (refcounted per-room adapters)          │
//! │   │    ├─ MemoryAdapter (single node)                    │
//! │   │    └─ RedisAdapter  (fleet-wide over pub/sub)        │
//! │   └─ message handler (mesh relay, or an SFU feeding      │
//! │      Signaller → Negotiator → PeerConnection)            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Fan-out guarantees: per client, frames go out in write order; per room,
//! every member observes broadcasts in the same order, across nodes when
//! the redis adapter is in use. Per peer connection, the negotiator keeps
//! at most one local offer outstanding and collapses concurrent
//! renegotiation requests.

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod message;
pub mod relay;
pub mod rtc;
pub mod signaling;
pub mod ws;

pub use config::{Config, IceServerConfig, RedisConfig, StoreConfig, StoreType};
pub use error::{Error, Result};
pub use message::{Message, MESSAGE_TYPE_ROOM_JOIN, MESSAGE_TYPE_ROOM_LEAVE};
pub use relay::mesh_message_handler;
pub use signaling::{Negotiator, Payload, Signal, Signaller};
pub use ws::{
    CleanupEvent, CleanupHandler, Client, MemoryAdapter, MessageHandler, RedisAdapter,
    RoomAdapter, RoomEvent, RoomHandler, RoomManager, WsServer, WsServerHandle,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
