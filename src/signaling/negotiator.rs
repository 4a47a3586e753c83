//! SDP negotiation state machine
//!
//! Sequences offer creation so at most one local offer is outstanding per
//! peer connection. A `negotiate()` that arrives while an offer is in
//! flight is collapsed into a single queued bit; when the peer connection
//! returns to the stable signaling state, exactly one follow-up negotiation
//! runs. Transceiver requests made mid-negotiation are queued and applied
//! just before the follow-up offer.
//!
//! Responders never create offers: their `negotiate()` asks the initiator
//! to renegotiate via the request callback.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::rtc::{PeerConnection, SignalingState};
use crate::signaling::payload::{SessionDescription, TrackKind, TransceiverDirection};
use crate::Result;

/// A transceiver to add before the next offer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransceiverRequest {
    pub kind: TrackKind,
    pub direction: TransceiverDirection,
}

/// Invoked with each locally created offer (or the error creating it)
pub type OnOffer =
    Arc<dyn Fn(Result<SessionDescription>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked when a responder needs the initiator to start a negotiation
pub type OnRequestNegotiation = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct State {
    negotiating: bool,
    queued_negotiation: bool,
    queued_transceivers: Vec<TransceiverRequest>,
}

/// Drives offer/answer sequencing for one peer connection
pub struct Negotiator {
    initiator: bool,
    peer_connection: Arc<dyn PeerConnection>,
    remote_peer_id: String,
    on_offer: OnOffer,
    on_request_negotiation: OnRequestNegotiation,
    state: Mutex<State>,
}

impl Negotiator {
    pub fn new(
        initiator: bool,
        peer_connection: Arc<dyn PeerConnection>,
        remote_peer_id: impl Into<String>,
        on_offer: OnOffer,
        on_request_negotiation: OnRequestNegotiation,
    ) -> Arc<Self> {
        let negotiator = Arc::new(Self {
            initiator,
            peer_connection: Arc::clone(&peer_connection),
            remote_peer_id: remote_peer_id.into(),
            on_offer,
            on_request_negotiation,
            state: Mutex::new(State::default()),
        });

        // Stable means the outstanding offer got its answer (or the answer
        // we produced was applied); this is the only completion signal.
        let weak = Arc::downgrade(&negotiator);
        peer_connection.on_signaling_state_change(Box::new(move |state| {
            if state == SignalingState::Stable {
                if let Some(negotiator) = weak.upgrade() {
                    tokio::spawn(async move {
                        negotiator.handle_done_negotiation().await;
                    });
                }
            }
        }));

        negotiator
    }

    /// Whether a negotiation is currently in flight
    pub fn is_negotiating(&self) -> bool {
        self.state.lock().expect("negotiator lock poisoned").negotiating
    }

    /// Start a negotiation, or queue one if an offer is already in flight.
    pub async fn negotiate(&self) {
        {
            let mut state = self.state.lock().expect("negotiator lock poisoned");
            if state.negotiating {
                debug!(remote = %self.remote_peer_id, "Negotiation in flight, queueing");
                state.queued_negotiation = true;
                return;
            }
            state.negotiating = true;
        }

        if self.initiator {
            self.create_and_send_offer().await;
        } else {
            debug!(remote = %self.remote_peer_id, "Requesting negotiation from initiator");
            (self.on_request_negotiation)();
        }
    }

    /// Queue a transceiver for the next offer and negotiate. When idle the
    /// transceiver is applied immediately as part of that negotiation.
    pub async fn add_transceiver_from_kind(&self, request: TransceiverRequest) {
        self.state
            .lock()
            .expect("negotiator lock poisoned")
            .queued_transceivers
            .push(request);
        self.negotiate().await;
    }

    async fn create_and_send_offer(&self) {
        let queued: Vec<TransceiverRequest> = {
            let mut state = self.state.lock().expect("negotiator lock poisoned");
            state.queued_transceivers.drain(..).collect()
        };

        for request in queued {
            debug!(
                remote = %self.remote_peer_id,
                kind = ?request.kind,
                "Adding queued transceiver"
            );
            if let Err(e) = self
                .peer_connection
                .add_transceiver_from_kind(request.kind, request.direction)
                .await
            {
                error!(remote = %self.remote_peer_id, error = %e, "Error adding transceiver");
            }
        }

        let offer = self.peer_connection.create_offer().await;
        (self.on_offer)(offer).await;
    }

    async fn handle_done_negotiation(&self) {
        let renegotiate = {
            let mut state = self.state.lock().expect("negotiator lock poisoned");
            state.negotiating = false;
            std::mem::take(&mut state.queued_negotiation)
        };

        if renegotiate {
            debug!(remote = %self.remote_peer_id, "Running queued negotiation");
            self.negotiate().await;
        }
    }
}
