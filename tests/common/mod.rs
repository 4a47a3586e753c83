//! Shared helpers for integration tests: a WebSocket test client and a
//! room-adapter wrapper that records lifecycle calls.

// Each integration-test crate uses its own subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use peer_calls::ws::Client;
use peer_calls::{Message, Result, RoomAdapter};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Minimal signaling client for driving a real server
pub struct TestClient {
    sink: SplitSink<WsStream, WsMessage>,
    stream: SplitStream<WsStream>,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr, room: &str, client_id: &str) -> Self {
        let url = format!("ws://{}/ws/{}/{}", addr, room, client_id);
        let (ws, _resp) = connect_async(url).await.expect("websocket connect failed");
        let (sink, stream) = ws.split();
        Self { sink, stream }
    }

    pub async fn send(&mut self, msg: &Message) {
        self.sink
            .send(WsMessage::Text(msg.to_json().unwrap().into()))
            .await
            .expect("websocket send failed");
    }

    /// Next message, failing the test after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> Message {
        let deadline = tokio::time::sleep(RECV_TIMEOUT);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                frame = self.stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        return Message::from_json(&text).expect("malformed frame from server")
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("websocket stream ended: {:?}", other),
                },
                _ = &mut deadline => panic!("timed out waiting for message"),
            }
        }
    }

    /// Close the connection from the client side.
    pub async fn close(mut self) {
        let _ = self.sink.send(WsMessage::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

/// Delegating adapter that appends lifecycle calls to a shared log
pub struct RecordingAdapter {
    inner: Arc<dyn RoomAdapter>,
    log: Arc<std::sync::Mutex<Vec<String>>>,
}

impl RecordingAdapter {
    pub fn new(inner: Arc<dyn RoomAdapter>, log: Arc<std::sync::Mutex<Vec<String>>>) -> Self {
        Self { inner, log }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl RoomAdapter for RecordingAdapter {
    async fn add(&self, client: Arc<Client>) -> Result<()> {
        self.record(format!("add:{}", client.id()));
        self.inner.add(client).await
    }

    async fn remove(&self, client_id: &str) -> Result<()> {
        self.record(format!("remove:{}", client_id));
        self.inner.remove(client_id).await
    }

    async fn broadcast(&self, msg: Message) -> Result<()> {
        self.inner.broadcast(msg).await
    }

    async fn emit(&self, client_id: &str, msg: Message) -> Result<()> {
        self.inner.emit(client_id, msg).await
    }

    async fn clients(&self) -> Result<HashMap<String, String>> {
        self.inner.clients().await
    }

    async fn metadata(&self, client_id: &str) -> Option<String> {
        self.inner.metadata(client_id).await
    }

    async fn set_metadata(&self, client_id: &str, metadata: String) {
        self.inner.set_metadata(client_id, metadata).await
    }

    async fn close(&self) -> Result<()> {
        self.record("close".to_string());
        self.inner.close().await
    }
}
