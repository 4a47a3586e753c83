//! Signaller: binds the negotiator, a peer connection and the room relay
//!
//! A signaller lives for one peer connection. Inbound `signal` payloads are
//! translated into negotiation actions; outbound signals (offers, answers,
//! renegotiation requests, transceiver requests, ICE candidates) leave
//! through the `on_signal` callback, addressed from the local peer id. The
//! negotiator reaches back through two plain callbacks rather than an
//! ownership edge, and close is a one-shot latch that also fires when ICE
//! reports closed, disconnected or failed.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::rtc::{IceConnectionState, MediaEngine, PeerConnection};
use crate::signaling::negotiator::{Negotiator, TransceiverRequest};
use crate::signaling::payload::{
    Payload, SdpType, SessionDescription, Signal, TrackKind, TransceiverDirection,
};
use crate::{Error, Result};

/// Receives every outbound signal payload, addressed from the local peer
pub type OnSignal = Arc<dyn Fn(Payload) + Send + Sync>;

/// Signaling endpoint for one peer connection
pub struct Signaller {
    initiator: bool,
    peer_connection: Arc<dyn PeerConnection>,
    media_engine: Arc<dyn MediaEngine>,
    local_peer_id: String,
    remote_peer_id: String,
    on_signal: OnSignal,
    negotiator: Arc<Negotiator>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl Signaller {
    /// Build a signaller and run its initialization sequence: initiators
    /// register default codecs, both sides pre-add receive-only video and
    /// audio transceivers (so responders advertise receive capability before
    /// the first offer), and initiators kick off the first negotiation.
    pub async fn new(
        initiator: bool,
        peer_connection: Arc<dyn PeerConnection>,
        media_engine: Arc<dyn MediaEngine>,
        local_peer_id: impl Into<String>,
        remote_peer_id: impl Into<String>,
        on_signal: OnSignal,
    ) -> Result<Arc<Self>> {
        let local_peer_id = local_peer_id.into();
        let remote_peer_id = remote_peer_id.into();
        let (closed_tx, closed_rx) = watch::channel(false);

        let negotiator = {
            let pc = Arc::clone(&peer_connection);
            let on_signal_offer = Arc::clone(&on_signal);
            let local = local_peer_id.clone();
            let remote = remote_peer_id.clone();
            let on_offer = Arc::new(move |offer: Result<SessionDescription>| {
                let pc = Arc::clone(&pc);
                let on_signal = Arc::clone(&on_signal_offer);
                let local = local.clone();
                let remote = remote.clone();
                Box::pin(async move {
                    let offer = match offer {
                        Ok(offer) => offer,
                        Err(e) => {
                            error!(remote = %remote, error = %e, "Error creating local offer");
                            return;
                        }
                    };
                    if let Err(e) = pc.set_local_description(offer.clone()).await {
                        error!(remote = %remote, error = %e, "Error setting local offer");
                        return;
                    }
                    on_signal(Payload::sdp(&local, offer));
                }) as futures::future::BoxFuture<'static, ()>
            });

            let on_signal_renegotiate = Arc::clone(&on_signal);
            let local = local_peer_id.clone();
            let remote = remote_peer_id.clone();
            let on_request_negotiation = Arc::new(move || {
                debug!(remote = %remote, "Sending renegotiation request to initiator");
                on_signal_renegotiate(Payload::renegotiate(&local));
            });

            Negotiator::new(
                initiator,
                Arc::clone(&peer_connection),
                remote_peer_id.clone(),
                on_offer,
                on_request_negotiation,
            )
        };

        let signaller = Arc::new(Self {
            initiator,
            peer_connection: Arc::clone(&peer_connection),
            media_engine,
            local_peer_id,
            remote_peer_id,
            on_signal,
            negotiator,
            closed_tx,
            closed_rx,
        });

        let weak = Arc::downgrade(&signaller);
        peer_connection.on_ice_connection_state_change(Box::new(move |state| {
            debug!(state = ?state, "ICE connection state changed");
            if matches!(
                state,
                IceConnectionState::Closed
                    | IceConnectionState::Disconnected
                    | IceConnectionState::Failed
            ) {
                if let Some(signaller) = weak.upgrade() {
                    tokio::spawn(async move {
                        signaller.close().await;
                    });
                }
            }
        }));

        let weak = Arc::downgrade(&signaller);
        peer_connection.on_ice_candidate(Box::new(move |candidate| {
            let candidate = match candidate {
                Some(candidate) => candidate,
                None => return,
            };
            if let Some(signaller) = weak.upgrade() {
                debug!(remote = %signaller.remote_peer_id, "Got local ICE candidate");
                (signaller.on_signal)(Payload::candidate(&signaller.local_peer_id, candidate));
            }
        }));

        signaller.initialize().await?;

        Ok(signaller)
    }

    async fn initialize(&self) -> Result<()> {
        if self.initiator {
            debug!(remote = %self.remote_peer_id, "Initiator registering default codecs");
            self.media_engine.register_default_codecs()?;
        }

        for kind in [TrackKind::Video, TrackKind::Audio] {
            debug!(remote = %self.remote_peer_id, kind = ?kind, "Pre-adding recvonly transceiver");
            self.peer_connection
                .add_transceiver_from_kind(kind, TransceiverDirection::Recvonly)
                .await?;
        }

        if self.initiator {
            self.negotiator.negotiate().await;
        }
        Ok(())
    }

    pub fn initiator(&self) -> bool {
        self.initiator
    }

    pub fn local_peer_id(&self) -> &str {
        &self.local_peer_id
    }

    pub fn remote_peer_id(&self) -> &str {
        &self.remote_peer_id
    }

    /// Handle an inbound signal payload from the remote peer.
    pub async fn signal(&self, payload: Payload) -> Result<()> {
        match payload.signal {
            Signal::Candidate(signal) => {
                debug!(remote = %self.remote_peer_id, "Remote ICE candidate");
                self.peer_connection
                    .add_ice_candidate(signal.candidate)
                    .await
            }
            Signal::Renegotiate(signal) => {
                if !signal.renegotiate {
                    return Err(Error::UnexpectedSignal(
                        "renegotiate must be true".to_string(),
                    ));
                }
                debug!(remote = %self.remote_peer_id, "Remote peer requested negotiation");
                self.negotiator.negotiate().await;
                Ok(())
            }
            Signal::TransceiverRequest(signal) => {
                let direction = signal
                    .transceiver_request
                    .init
                    .map(|init| init.direction)
                    .unwrap_or(TransceiverDirection::Sendrecv);
                debug!(
                    remote = %self.remote_peer_id,
                    kind = ?signal.transceiver_request.kind,
                    "Remote transceiver request"
                );
                self.negotiator
                    .add_transceiver_from_kind(TransceiverRequest {
                        kind: signal.transceiver_request.kind,
                        direction,
                    })
                    .await;
                Ok(())
            }
            Signal::Sdp(description) => match description.typ {
                SdpType::Offer => self.handle_remote_offer(description).await,
                SdpType::Answer => self.handle_remote_answer(description).await,
                other => Err(Error::UnexpectedSignal(format!(
                    "Unexpected sdp type: {:?}",
                    other
                ))),
            },
        }
    }

    async fn handle_remote_offer(&self, offer: SessionDescription) -> Result<()> {
        self.media_engine.populate_from_sdp(&offer)?;
        self.peer_connection.set_remote_description(offer).await?;

        let answer = self.peer_connection.create_answer().await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;

        (self.on_signal)(Payload::sdp(&self.local_peer_id, answer));
        Ok(())
    }

    async fn handle_remote_answer(&self, answer: SessionDescription) -> Result<()> {
        // The signaling-state transition back to stable tells the negotiator
        // this negotiation is done.
        self.peer_connection.set_remote_description(answer).await
    }

    /// Ask the initiator for a new transceiver. A no-op on the initiator
    /// side, which adds transceivers directly.
    pub fn send_transceiver_request(&self, kind: TrackKind, direction: TransceiverDirection) {
        if self.initiator {
            return;
        }
        info!(remote = %self.remote_peer_id, kind = ?kind, "Sending transceiver request to initiator");
        (self.on_signal)(Payload::transceiver_request(
            &self.local_peer_id,
            kind,
            direction,
        ));
    }

    /// Start a negotiation (or queue one while an offer is outstanding).
    pub async fn negotiate(&self) {
        self.negotiator.negotiate().await;
    }

    /// Close the peer connection and fire the closed latch. Idempotent;
    /// also triggered by ICE reaching closed, disconnected or failed.
    pub async fn close(&self) {
        if self.closed_tx.send_replace(true) {
            return;
        }
        info!(remote = %self.remote_peer_id, "Closing signaller");
        if let Err(e) = self.peer_connection.close().await {
            warn!(remote = %self.remote_peer_id, error = %e, "Error closing peer connection");
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Wait until the signaller is closed.
    pub async fn done(&self) {
        let mut closed = self.closed_rx.clone();
        while !*closed.borrow() {
            if closed.changed().await.is_err() {
                return;
            }
        }
    }
}
