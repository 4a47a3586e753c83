//! In-process room adapter
//!
//! Holds the member map under one mutex and keeps the lock across the
//! fan-out loop, so every member observes broadcasts in the same order. A
//! member whose write fails is logged and skipped; fan-out never aborts on
//! one slow or dead consumer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::message::Message;
use crate::ws::adapter::RoomAdapter;
use crate::ws::client::Client;
use crate::{Error, Result};

/// Single-process adapter for one room
pub struct MemoryAdapter {
    room: String,
    members: Mutex<HashMap<String, Arc<Client>>>,
    closed: AtomicBool,
}

impl MemoryAdapter {
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            members: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::AdapterClosed(self.room.clone()));
        }
        Ok(())
    }

    async fn fan_out(&self, members: &HashMap<String, Arc<Client>>, msg: &Message) {
        for (client_id, client) in members {
            if let Err(e) = client.write(msg).await {
                warn!(
                    room = %self.room,
                    client_id = %client_id,
                    error = %e,
                    "Dropping broadcast for member"
                );
            }
        }
    }
}

#[async_trait]
impl RoomAdapter for MemoryAdapter {
    async fn add(&self, client: Arc<Client>) -> Result<()> {
        self.ensure_open()?;

        let mut members = self.members.lock().await;
        let client_id = client.id().to_string();
        if members.contains_key(&client_id) {
            return Err(Error::DuplicateClient(client_id));
        }

        let metadata = client.metadata();
        members.insert(client_id.clone(), client);

        let join = Message::room_join(&self.room, &client_id, &metadata);
        self.fan_out(&members, &join).await;
        Ok(())
    }

    async fn remove(&self, client_id: &str) -> Result<()> {
        self.ensure_open()?;

        let mut members = self.members.lock().await;
        if members.remove(client_id).is_none() {
            debug!(room = %self.room, client_id = %client_id, "Remove for unknown member");
            return Ok(());
        }

        let leave = Message::room_leave(&self.room, client_id);
        self.fan_out(&members, &leave).await;
        Ok(())
    }

    async fn broadcast(&self, msg: Message) -> Result<()> {
        self.ensure_open()?;

        let members = self.members.lock().await;
        self.fan_out(&members, &msg).await;
        Ok(())
    }

    async fn emit(&self, client_id: &str, msg: Message) -> Result<()> {
        self.ensure_open()?;

        let members = self.members.lock().await;
        match members.get(client_id) {
            Some(client) => {
                if let Err(e) = client.write(&msg).await {
                    warn!(
                        room = %self.room,
                        client_id = %client_id,
                        error = %e,
                        "Dropping emit for member"
                    );
                }
            }
            None => {
                debug!(room = %self.room, client_id = %client_id, "Emit for unknown member");
            }
        }
        Ok(())
    }

    async fn clients(&self) -> Result<HashMap<String, String>> {
        self.ensure_open()?;

        let members = self.members.lock().await;
        Ok(members
            .iter()
            .map(|(id, client)| (id.clone(), client.metadata()))
            .collect())
    }

    async fn metadata(&self, client_id: &str) -> Option<String> {
        let members = self.members.lock().await;
        members.get(client_id).map(|c| c.metadata())
    }

    async fn set_metadata(&self, client_id: &str, metadata: String) {
        let members = self.members.lock().await;
        if let Some(client) = members.get(client_id) {
            client.set_metadata(metadata);
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.members.lock().await.clear();
        debug!(room = %self.room, "Memory adapter closed");
        Ok(())
    }
}
