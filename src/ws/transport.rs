//! Frame transport seam between client sessions and the socket
//!
//! A [`FrameTransport`] delivers whole text frames in both directions; one
//! frame carries exactly one serialized message. The production
//! implementation wraps a tokio-tungstenite WebSocket stream. Tests
//! substitute a channel-backed transport.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

use crate::{Error, Result};

/// Bidirectional text-frame transport
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Send one text frame
    async fn send(&self, frame: String) -> Result<()>;

    /// Receive the next text frame. `Ok(None)` means the peer closed the
    /// connection normally.
    async fn recv(&self) -> Result<Option<String>>;

    /// Close the underlying connection. Idempotent and best-effort.
    async fn close(&self);
}

/// WebSocket-backed transport over any upgraded stream
pub struct WsTransport<S> {
    sink: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl<S> FrameTransport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, frame: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => {
                    Error::ClientClosed("websocket closed".to_string())
                }
                other => Error::WebSocketError(other.to_string()),
            })
    }

    async fn recv(&self) -> Result<Option<String>> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                None => return Ok(None),
                Some(Ok(WsMessage::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                Some(Ok(WsMessage::Ping(data))) => {
                    let mut sink = self.sink.lock().await;
                    let _ = sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    return Ok(None)
                }
                Some(Err(e)) => return Err(Error::WebSocketError(e.to_string())),
            }
        }
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink
            .send(WsMessage::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "".into(),
            })))
            .await;
        let _ = sink.close().await;
    }
}
