//! Room adapter contract
//!
//! An adapter owns membership and fan-out for exactly one room. The
//! in-process [`MemoryAdapter`](crate::ws::memory::MemoryAdapter) serves
//! single-node deployments; the [`RedisAdapter`](crate::ws::redis::RedisAdapter)
//! spans a server fleet over a pub/sub bus. Every implementation provides
//! the same per-adapter broadcast ordering: all members observe broadcasts
//! in one total order.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;
use crate::ws::client::Client;
use crate::Result;

/// Fan-out and membership operations for one room
#[async_trait]
pub trait RoomAdapter: Send + Sync {
    /// Register a client, then broadcast `ws_room_join` with its id and
    /// metadata. Every observer of the join will find the client in a
    /// subsequent [`RoomAdapter::clients`] snapshot.
    async fn add(&self, client: Arc<Client>) -> Result<()>;

    /// Unregister a client, then broadcast `ws_room_leave`. Unknown ids are
    /// a logged no-op.
    async fn remove(&self, client_id: &str) -> Result<()>;

    /// Deliver to all current members, including the sender.
    async fn broadcast(&self, msg: Message) -> Result<()>;

    /// Deliver to one member; a no-op if the member is absent.
    async fn emit(&self, client_id: &str, msg: Message) -> Result<()>;

    /// Snapshot of the membership map, client id to metadata. For the
    /// distributed adapter this covers all nodes, not only local members.
    async fn clients(&self) -> Result<HashMap<String, String>>;

    /// Metadata for one member, if present.
    async fn metadata(&self, client_id: &str) -> Option<String>;

    /// Replace the metadata for one member.
    async fn set_metadata(&self, client_id: &str, metadata: String);

    /// Release adapter resources. Further operations fail with
    /// [`Error::AdapterClosed`](crate::Error::AdapterClosed).
    async fn close(&self) -> Result<()>;
}
