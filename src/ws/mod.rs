//! Room fan-out plane: client sessions, adapters, registry, socket handler

pub mod adapter;
pub mod client;
pub mod handler;
pub mod memory;
pub mod redis;
pub mod rooms;
pub mod server;
pub mod transport;

pub use adapter::RoomAdapter;
pub use client::Client;
pub use handler::{CleanupEvent, CleanupHandler, MessageHandler, RoomEvent, RoomHandler};
pub use memory::MemoryAdapter;
pub use redis::RedisAdapter;
pub use rooms::{AdapterFactory, RoomManager};
pub use server::{WsServer, WsServerHandle};
pub use transport::{FrameTransport, WsTransport};
