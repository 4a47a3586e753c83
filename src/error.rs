//! Error types for the signaling server

/// Result type alias using the crate Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in room fan-out and signaling operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Inbound frame was not a valid message envelope
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Serialization of an outbound message failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation on a client whose session is already closed
    #[error("Client closed: {0}")]
    ClientClosed(String),

    /// Subscribe ended because the client was closed locally
    #[error("Subscription cancelled: {0}")]
    Cancelled(String),

    /// A second concurrent subscribe was attempted on one client
    #[error("Client already subscribed: {0}")]
    AlreadySubscribed(String),

    /// The per-client write queue is full
    #[error("Write queue full for client: {0}")]
    WriteQueueFull(String),

    /// Add for a client id that is already a member
    #[error("Duplicate client in room: {0}")]
    DuplicateClient(String),

    /// Operation on an adapter that has been closed
    #[error("Room adapter closed: {0}")]
    AdapterClosed(String),

    /// Pub/sub bus publish or subscribe failure
    #[error("Bus error: {0}")]
    BusError(#[from] redis::RedisError),

    /// Inbound signal that is meaningless in the current state
    #[error("Unexpected signal: {0}")]
    UnexpectedSignal(String),

    /// SDP creation or application failed
    #[error("Negotiation error: {0}")]
    NegotiationError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error ends the owning session. Errors that break session
    /// invariants unwind the teardown sequence; the rest are recovered
    /// in place.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            Error::ClientClosed(_)
                | Error::AdapterClosed(_)
                | Error::BusError(_)
                | Error::WebSocketError(_)
                | Error::IoError(_)
        )
    }

    /// Whether this error is a malformed inbound frame. Malformed frames are
    /// surfaced to the message handler without tearing the session down.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Error::MalformedFrame(_))
    }
}
