//! Client session bound to one socket
//!
//! A [`Client`] owns one [`FrameTransport`] for its whole life. Outbound
//! messages go through a bounded write queue drained by a single writer
//! task, so frame bytes never interleave and wire order follows the order
//! in which [`Client::write`] returned. Inbound frames are pumped by
//! [`Client::subscribe`], which invokes the caller's handler once per frame,
//! in wire order.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::Message;
use crate::ws::transport::FrameTransport;
use crate::{Error, Result};

/// Frames buffered per client before writes start failing. A member that
/// cannot drain this many frames is skipped by room fan-out rather than
/// allowed to stall it.
const WRITE_QUEUE_CAPACITY: usize = 64;

/// One client session with a stable id and opaque metadata
pub struct Client {
    id: String,
    metadata: Mutex<String>,
    transport: Arc<dyn FrameTransport>,
    queue: mpsc::Sender<String>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    subscribed: AtomicBool,
}

impl Client {
    /// Create a client with a generated UUID id
    pub fn new(transport: Arc<dyn FrameTransport>) -> Self {
        Self::with_id(transport, Uuid::new_v4().to_string())
    }

    /// Create a client with a caller-assigned id
    pub fn with_id(transport: Arc<dyn FrameTransport>, id: impl Into<String>) -> Self {
        let id = id.into();
        let (queue_tx, queue_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(Self::write_pump(
            id.clone(),
            Arc::clone(&transport),
            queue_rx,
            closed_rx.clone(),
        ));

        Self {
            id,
            metadata: Mutex::new(String::new()),
            transport,
            queue: queue_tx,
            closed_tx,
            closed_rx,
            subscribed: AtomicBool::new(false),
        }
    }

    /// Stable identifier assigned at construction
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Opaque metadata attached to this client
    pub fn metadata(&self) -> String {
        self.metadata.lock().expect("metadata lock poisoned").clone()
    }

    pub fn set_metadata(&self, metadata: impl Into<String>) {
        *self.metadata.lock().expect("metadata lock poisoned") = metadata.into();
    }

    /// Whether [`Client::close`] has been called
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Serialize `msg` and hand it to the writer.
    ///
    /// Fails with [`Error::ClientClosed`] after close and
    /// [`Error::WriteQueueFull`] when the write queue is saturated.
    pub async fn write(&self, msg: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClientClosed(self.id.clone()));
        }

        let frame = msg.to_json()?;
        match self.queue.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::WriteQueueFull(self.id.clone())),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::ClientClosed(self.id.clone())),
        }
    }

    /// Read frames in order and invoke `handler` once per frame.
    ///
    /// Returns `Ok(())` when the peer closes normally, `Err(Cancelled)` when
    /// the client is closed locally mid-subscribe, and the transport error
    /// otherwise. A malformed frame is logged and skipped without ending the
    /// session. At most one subscribe may run per client.
    pub async fn subscribe<F, Fut>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(Message) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadySubscribed(self.id.clone()));
        }

        let result = self.subscribe_inner(&mut handler).await;
        self.subscribed.store(false, Ordering::SeqCst);
        result
    }

    async fn subscribe_inner<F, Fut>(&self, handler: &mut F) -> Result<()>
    where
        F: FnMut(Message) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        let mut closed = self.closed_rx.clone();
        if *closed.borrow() {
            return Err(Error::Cancelled(self.id.clone()));
        }

        loop {
            tokio::select! {
                _ = closed.changed() => {
                    if *closed.borrow() {
                        return Err(Error::Cancelled(self.id.clone()));
                    }
                }
                received = self.transport.recv() => match received {
                    Ok(Some(frame)) => match Message::from_json(&frame) {
                        Ok(msg) => handler(msg).await,
                        Err(e) => {
                            warn!(client_id = %self.id, error = %e, "Skipping malformed frame");
                        }
                    },
                    Ok(None) => return Ok(()),
                    Err(e) => return Err(e),
                },
            }
        }
    }

    /// Close the session. Idempotent; unblocks an in-flight subscribe and
    /// fails all subsequent writes.
    pub async fn close(&self) {
        let was_closed = self.closed_tx.send_replace(true);
        if was_closed {
            return;
        }

        debug!(client_id = %self.id, "Closing client session");
        self.transport.close().await;
    }

    async fn write_pump(
        id: String,
        transport: Arc<dyn FrameTransport>,
        mut queue: mpsc::Receiver<String>,
        mut closed: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = closed.changed() => {
                    if changed.is_err() || *closed.borrow() {
                        return;
                    }
                }
                frame = queue.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = transport.send(frame).await {
                            warn!(client_id = %id, error = %e, "Write pump stopping");
                            return;
                        }
                    }
                    None => return,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::transport::testing::ChannelTransport;
    use serde_json::json;
    use std::time::Duration;

    fn new_client() -> (
        Client,
        tokio::sync::mpsc::UnboundedReceiver<String>,
        tokio::sync::mpsc::UnboundedSender<String>,
    ) {
        let (transport, out_rx, in_tx) = ChannelTransport::new();
        (Client::with_id(Arc::new(transport), "c1"), out_rx, in_tx)
    }

    #[tokio::test]
    async fn test_write_reaches_transport_in_order() {
        let (client, mut out_rx, _in_tx) = new_client();

        for i in 0..3 {
            client
                .write(&Message::new("t", "r", json!(i)))
                .await
                .unwrap();
        }

        for i in 0..3 {
            let frame = out_rx.recv().await.unwrap();
            let msg = Message::from_json(&frame).unwrap();
            assert_eq!(msg.payload, json!(i));
        }
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (client, _out_rx, _in_tx) = new_client();
        client.close().await;

        let err = client.write(&Message::new("t", "r", json!(1))).await;
        assert!(matches!(err, Err(Error::ClientClosed(_))));
    }

    #[tokio::test]
    async fn test_subscribe_delivers_frames_in_order() {
        let (client, _out_rx, in_tx) = new_client();

        for i in 0..3 {
            in_tx
                .send(Message::new("t", "r", json!(i)).to_json().unwrap())
                .unwrap();
        }
        drop(in_tx);

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        client
            .subscribe(|msg| {
                let seen_tx = seen_tx.clone();
                async move {
                    seen_tx.send(msg.payload).unwrap();
                }
            })
            .await
            .unwrap();

        for i in 0..3 {
            assert_eq!(seen_rx.recv().await.unwrap(), json!(i));
        }
    }

    #[tokio::test]
    async fn test_subscribe_skips_malformed_frames() {
        let (client, _out_rx, in_tx) = new_client();

        in_tx.send("{not json".to_string()).unwrap();
        in_tx
            .send(Message::new("t", "r", json!("ok")).to_json().unwrap())
            .unwrap();
        drop(in_tx);

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        client
            .subscribe(|msg| {
                let seen_tx = seen_tx.clone();
                async move {
                    seen_tx.send(msg.payload).unwrap();
                }
            })
            .await
            .unwrap();

        assert_eq!(seen_rx.recv().await.unwrap(), json!("ok"));
        assert!(seen_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_cancels_subscribe() {
        let (transport, _out_rx, _in_tx) = ChannelTransport::new();
        let client = Arc::new(Client::with_id(Arc::new(transport), "c1"));

        let subscriber = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.subscribe(|_| async {}).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        client.close().await;

        let result = tokio::time::timeout(Duration::from_secs(1), subscriber)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_second_subscribe_rejected() {
        let (transport, _out_rx, _in_tx) = ChannelTransport::new();
        let client = Arc::new(Client::with_id(Arc::new(transport), "c1"));

        let first = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.subscribe(|_| async {}).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = client.subscribe(|_| async {}).await;
        assert!(matches!(second, Err(Error::AlreadySubscribed(_))));

        client.close().await;
        let _ = first.await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (client, _out_rx, _in_tx) = new_client();
        client.close().await;
        client.close().await;
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_metadata() {
        let (client, _out_rx, _in_tx) = new_client();
        assert_eq!(client.metadata(), "");
        client.set_metadata("alice");
        assert_eq!(client.metadata(), "alice");
        assert_eq!(client.id(), "c1");
    }

    #[tokio::test]
    async fn test_generated_id_is_unique() {
        let (t1, _o1, _i1) = ChannelTransport::new();
        let (t2, _o2, _i2) = ChannelTransport::new();
        let a = Client::new(Arc::new(t1));
        let b = Client::new(Arc::new(t2));
        assert_ne!(a.id(), b.id());
        assert!(!a.id().is_empty());
    }
}
