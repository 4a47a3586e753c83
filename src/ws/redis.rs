//! Distributed room adapter over Redis pub/sub
//!
//! Two channel families per room carry the fan-out: a broadcast channel
//! every node hosting a member subscribes to, and one channel per client
//! for targeted emits. Membership lives in a shared hash so any node can
//! produce the full fleet-wide roster. Join publishes happen after the
//! member is written to the hash and leave publishes after removal, so an
//! observer of a join always finds the client in a later snapshot.
//!
//! The bus provides a total order per channel, which gives all members,
//! local and remote, the same relative broadcast order. Reconnection is out
//! of scope: bus failures surface to the caller and the adapter is torn
//! down by its owner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::{MultiplexedConnection, PubSubSink};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::message::Message;
use crate::ws::adapter::RoomAdapter;
use crate::ws::client::Client;
use crate::{Error, Result};

/// Every bus command fails instead of blocking past this deadline.
const BUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Room adapter spanning all server nodes that share one Redis bus
pub struct RedisAdapter {
    room: String,
    broadcast_channel: String,
    client_channel_prefix: String,
    clients_key: String,
    conn: MultiplexedConnection,
    sink: Mutex<PubSubSink>,
    members: Arc<Mutex<HashMap<String, Arc<Client>>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RedisAdapter {
    /// Connect a new adapter for `room` under the shared key `prefix`.
    ///
    /// Opens one command connection and one dedicated pub/sub connection,
    /// and spawns the subscription pump that dispatches bus frames to local
    /// members.
    pub async fn connect(
        client: &redis::Client,
        prefix: &str,
        room: impl Into<String>,
    ) -> Result<Self> {
        let room = room.into();
        let conn = client
            .get_multiplexed_async_connection_with_timeouts(BUS_TIMEOUT, BUS_TIMEOUT)
            .await?;
        let pubsub = client.get_async_pubsub().await?;
        let (sink, mut stream) = pubsub.split();

        let broadcast_channel = format!("{}:room:{}:broadcast", prefix, room);
        let client_channel_prefix = format!("{}:room:{}:", prefix, room);
        let clients_key = format!("{}:room:{}:clients", prefix, room);

        let members: Arc<Mutex<HashMap<String, Arc<Client>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let pump = {
            let members = Arc::clone(&members);
            let room = room.clone();
            let broadcast_channel = broadcast_channel.clone();
            let client_channel_prefix = client_channel_prefix.clone();

            tokio::spawn(async move {
                while let Some(bus_msg) = stream.next().await {
                    let channel = bus_msg.get_channel_name().to_string();
                    let payload: String = match bus_msg.get_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(room = %room, error = %e, "Non-text bus frame dropped");
                            continue;
                        }
                    };
                    let message = match Message::from_json(&payload) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!(room = %room, error = %e, "Malformed bus frame dropped");
                            continue;
                        }
                    };

                    let members = members.lock().await;
                    if channel == broadcast_channel {
                        for (client_id, member) in members.iter() {
                            if let Err(e) = member.write(&message).await {
                                warn!(
                                    room = %room,
                                    client_id = %client_id,
                                    error = %e,
                                    "Dropping broadcast for member"
                                );
                            }
                        }
                    } else if let Some(client_id) = channel.strip_prefix(&client_channel_prefix) {
                        if let Some(member) = members.get(client_id) {
                            if let Err(e) = member.write(&message).await {
                                warn!(
                                    room = %room,
                                    client_id = %client_id,
                                    error = %e,
                                    "Dropping emit for member"
                                );
                            }
                        }
                    }
                }
                debug!(room = %room, "Subscription pump ended");
            })
        };

        Ok(Self {
            room,
            broadcast_channel,
            client_channel_prefix,
            clients_key,
            conn,
            sink: Mutex::new(sink),
            members,
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        })
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

    fn client_channel(&self, client_id: &str) -> String {
        format!("{}{}", self.client_channel_prefix, client_id)
    }

    async fn publish(&self, channel: &str, msg: &Message) -> Result<()> {
        let frame = msg.to_json()?;
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, frame).await?;
        Ok(())
    }
}

#[async_trait]
impl RoomAdapter for RedisAdapter {
    async fn add(&self, client: Arc<Client>) -> Result<()> {
        self.ensure_open()?;

        let mut members = self.members.lock().await;
        let client_id = client.id().to_string();
        if members.contains_key(&client_id) {
            return Err(Error::DuplicateClient(client_id));
        }
        let metadata = client.metadata();

        // Membership hash first: anyone who observes the join publish below
        // must find this client in a later clients() snapshot.
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(&self.clients_key, &client_id, &metadata)
            .await?;

        {
            let mut sink = self.sink.lock().await;
            if members.is_empty() {
                sink.subscribe(&self.broadcast_channel).await?;
            }
            sink.subscribe(self.client_channel(&client_id)).await?;
        }

        members.insert(client_id.clone(), client);
        drop(members);

        self.publish(
            &self.broadcast_channel,
            &Message::room_join(&self.room, &client_id, &metadata),
        )
        .await
    }

    async fn remove(&self, client_id: &str) -> Result<()> {
        self.ensure_open()?;

        let mut members = self.members.lock().await;
        if members.remove(client_id).is_none() {
            debug!(room = %self.room, client_id = %client_id, "Remove for unknown member");
            return Ok(());
        }
        let no_local_members = members.is_empty();

        self.sink
            .lock()
            .await
            .unsubscribe(self.client_channel(client_id))
            .await?;
        drop(members);

        // Hash removal precedes the leave publish: an observer of the leave
        // must not find this client in a later clients() snapshot.
        let mut conn = self.conn.clone();
        conn.hdel::<_, _, ()>(&self.clients_key, client_id).await?;

        self.publish(
            &self.broadcast_channel,
            &Message::room_leave(&self.room, client_id),
        )
        .await?;

        if no_local_members {
            self.sink
                .lock()
                .await
                .unsubscribe(&self.broadcast_channel)
                .await?;
        }
        Ok(())
    }

    async fn broadcast(&self, msg: Message) -> Result<()> {
        self.ensure_open()?;
        self.publish(&self.broadcast_channel, &msg).await
    }

    async fn emit(&self, client_id: &str, msg: Message) -> Result<()> {
        self.ensure_open()?;
        self.publish(&self.client_channel(client_id), &msg).await
    }

    async fn clients(&self) -> Result<HashMap<String, String>> {
        self.ensure_open()?;
        let mut conn = self.conn.clone();
        let clients: HashMap<String, String> = conn.hgetall(&self.clients_key).await?;
        Ok(clients)
    }

    async fn metadata(&self, client_id: &str) -> Option<String> {
        let mut conn = self.conn.clone();
        conn.hget::<_, _, Option<String>>(&self.clients_key, client_id)
            .await
            .unwrap_or_else(|e| {
                warn!(room = %self.room, client_id = %client_id, error = %e, "Metadata read failed");
                None
            })
    }

    async fn set_metadata(&self, client_id: &str, metadata: String) {
        let mut conn = self.conn.clone();
        let exists: bool = match conn.hexists(&self.clients_key, client_id).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(room = %self.room, client_id = %client_id, error = %e, "Metadata write failed");
                return;
            }
        };
        if !exists {
            return;
        }
        if let Err(e) = conn
            .hset::<_, _, _, ()>(&self.clients_key, client_id, metadata)
            .await
        {
            warn!(room = %self.room, client_id = %client_id, error = %e, "Metadata write failed");
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(room = %self.room, "Closing redis adapter");

        let local: Vec<String> = {
            let mut members = self.members.lock().await;
            members.drain().map(|(id, _)| id).collect()
        };

        let mut result = Ok(());

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.unsubscribe(&self.broadcast_channel).await {
                result = Err(Error::BusError(e));
            }
            for client_id in &local {
                if let Err(e) = sink.unsubscribe(self.client_channel(client_id)).await {
                    result = Err(Error::BusError(e));
                }
            }
        }

        let mut conn = self.conn.clone();
        for client_id in &local {
            if let Err(e) = conn
                .hdel::<_, _, ()>(&self.clients_key, client_id)
                .await
            {
                result = Err(Error::BusError(e));
                continue;
            }
            if let Err(e) = self
                .publish(
                    &self.broadcast_channel,
                    &Message::room_leave(&self.room, client_id),
                )
                .await
            {
                result = Err(e);
            }
        }

        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }

        result
    }
}
