//! Negotiation scenarios against a fake peer connection that records every
//! call and lets the test drive the signaling and ICE state callbacks:
//! the happy path, glare handling, and responder renegotiation requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use peer_calls::rtc::{
    IceCandidateHandler, IceConnectionState, IceConnectionStateHandler, MediaEngine,
    PeerConnection, SignalingState, SignalingStateHandler,
};
use peer_calls::signaling::{
    IceCandidateInit, Payload, SdpType, SessionDescription, Signal, Signaller, TrackKind,
    TransceiverDirection,
};
use peer_calls::Result;

/// Records every call and exposes the registered callbacks to the test
#[derive(Default)]
struct FakePeerConnection {
    offers_created: AtomicUsize,
    answers_created: AtomicUsize,
    closed: AtomicUsize,
    local_descriptions: Mutex<Vec<SessionDescription>>,
    remote_descriptions: Mutex<Vec<SessionDescription>>,
    transceivers: Mutex<Vec<(TrackKind, TransceiverDirection)>>,
    ice_candidates: Mutex<Vec<IceCandidateInit>>,
    signaling_handler: Mutex<Option<SignalingStateHandler>>,
    ice_handler: Mutex<Option<IceConnectionStateHandler>>,
    candidate_handler: Mutex<Option<IceCandidateHandler>>,
}

impl FakePeerConnection {
    fn drive_signaling(&self, state: SignalingState) {
        if let Some(handler) = self.signaling_handler.lock().unwrap().as_ref() {
            handler(state);
        }
    }

    fn drive_ice_connection(&self, state: IceConnectionState) {
        if let Some(handler) = self.ice_handler.lock().unwrap().as_ref() {
            handler(state);
        }
    }

    fn drive_candidate(&self, candidate: Option<IceCandidateInit>) {
        if let Some(handler) = self.candidate_handler.lock().unwrap().as_ref() {
            handler(candidate);
        }
    }

    fn offers(&self) -> usize {
        self.offers_created.load(Ordering::SeqCst)
    }

    fn transceivers(&self) -> Vec<(TrackKind, TransceiverDirection)> {
        self.transceivers.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    fn on_ice_candidate(&self, handler: IceCandidateHandler) {
        *self.candidate_handler.lock().unwrap() = Some(handler);
    }

    fn on_signaling_state_change(&self, handler: SignalingStateHandler) {
        *self.signaling_handler.lock().unwrap() = Some(handler);
    }

    fn on_ice_connection_state_change(&self, handler: IceConnectionStateHandler) {
        *self.ice_handler.lock().unwrap() = Some(handler);
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        self.ice_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn add_transceiver_from_kind(
        &self,
        kind: TrackKind,
        direction: TransceiverDirection,
    ) -> Result<()> {
        self.transceivers.lock().unwrap().push((kind, direction));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.remote_descriptions.lock().unwrap().push(description);
        Ok(())
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.local_descriptions.lock().unwrap().push(description);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let n = self.offers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(format!("v=0\r\no=offer-{}\r\n", n)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let n = self.answers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::answer(format!("v=0\r\no=answer-{}\r\n", n)))
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeMediaEngine {
    defaults_registered: AtomicUsize,
    populated: Mutex<Vec<String>>,
}

impl MediaEngine for FakeMediaEngine {
    fn register_default_codecs(&self) -> Result<()> {
        self.defaults_registered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn populate_from_sdp(&self, description: &SessionDescription) -> Result<()> {
        self.populated.lock().unwrap().push(description.sdp.clone());
        Ok(())
    }
}

struct Harness {
    pc: Arc<FakePeerConnection>,
    engine: Arc<FakeMediaEngine>,
    signaller: Arc<Signaller>,
    signals: Arc<Mutex<Vec<Payload>>>,
}

impl Harness {
    async fn new(initiator: bool) -> Self {
        let pc = Arc::new(FakePeerConnection::default());
        let engine = Arc::new(FakeMediaEngine::default());
        let signals: Arc<Mutex<Vec<Payload>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&signals);
        let signaller = Signaller::new(
            initiator,
            Arc::clone(&pc) as Arc<dyn PeerConnection>,
            Arc::clone(&engine) as Arc<dyn MediaEngine>,
            "local-peer",
            "remote-peer",
            Arc::new(move |payload| sink.lock().unwrap().push(payload)),
        )
        .await
        .expect("signaller construction failed");

        Self {
            pc,
            engine,
            signaller,
            signals,
        }
    }

    fn emitted(&self) -> Vec<Payload> {
        self.signals.lock().unwrap().clone()
    }

    fn emitted_offers(&self) -> usize {
        self.emitted()
            .iter()
            .filter(|p| matches!(&p.signal, Signal::Sdp(sd) if sd.typ == SdpType::Offer))
            .count()
    }

    /// Complete the outstanding negotiation: deliver the remote answer and
    /// drive the signaling state back to stable.
    async fn complete_negotiation(&self) {
        self.signaller
            .signal(Payload::sdp(
                "remote-peer",
                SessionDescription::answer("v=0\r\no=answer\r\n"),
            ))
            .await
            .unwrap();
        self.pc.drive_signaling(SignalingState::Stable);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_initiator_emits_exactly_one_offer() {
    let harness = Harness::new(true).await;

    // Default codecs registered, recvonly transceivers pre-added.
    assert_eq!(harness.engine.defaults_registered.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.pc.transceivers(),
        vec![
            (TrackKind::Video, TransceiverDirection::Recvonly),
            (TrackKind::Audio, TransceiverDirection::Recvonly),
        ]
    );

    assert_eq!(harness.pc.offers(), 1);
    assert_eq!(harness.emitted_offers(), 1);

    // The offer was installed locally before being emitted.
    let locals = harness.pc.local_descriptions.lock().unwrap().clone();
    assert_eq!(locals.len(), 1);
    assert_eq!(locals[0].typ, SdpType::Offer);

    harness.complete_negotiation().await;

    // The answer reached the peer connection and no extra offer appeared.
    let remotes = harness.pc.remote_descriptions.lock().unwrap().clone();
    assert_eq!(remotes.len(), 1);
    assert_eq!(remotes[0].typ, SdpType::Answer);
    assert_eq!(harness.pc.offers(), 1);
}

#[tokio::test]
async fn test_renegotiate_after_answer_creates_second_offer() {
    let harness = Harness::new(true).await;
    harness.complete_negotiation().await;

    harness.signaller.negotiate().await;
    assert_eq!(harness.pc.offers(), 2);
    assert_eq!(harness.emitted_offers(), 2);
}

#[tokio::test]
async fn test_glare_queues_single_followup() {
    let harness = Harness::new(true).await;
    assert_eq!(harness.pc.offers(), 1);

    // Offer O1 is outstanding; the peer asks for a video transceiver. The
    // request must be queued, not negotiated concurrently.
    harness
        .signaller
        .signal(Payload::transceiver_request(
            "remote-peer",
            TrackKind::Video,
            TransceiverDirection::Sendrecv,
        ))
        .await
        .unwrap();

    // Pile on extra renegotiation requests mid-flight; they collapse.
    harness
        .signaller
        .signal(Payload::renegotiate("remote-peer"))
        .await
        .unwrap();
    harness
        .signaller
        .signal(Payload::renegotiate("remote-peer"))
        .await
        .unwrap();

    assert_eq!(harness.pc.offers(), 1, "no concurrent offers");
    assert!(!harness
        .pc
        .transceivers()
        .contains(&(TrackKind::Video, TransceiverDirection::Sendrecv)));

    harness.complete_negotiation().await;

    // Exactly one follow-up, with the queued transceiver applied first.
    assert_eq!(harness.pc.offers(), 2);
    assert_eq!(harness.emitted_offers(), 2);
    assert!(harness
        .pc
        .transceivers()
        .contains(&(TrackKind::Video, TransceiverDirection::Sendrecv)));

    // Completing the follow-up does not spawn a third negotiation.
    harness.complete_negotiation().await;
    assert_eq!(harness.pc.offers(), 2);
}

#[tokio::test]
async fn test_responder_emits_renegotiate_request() {
    let harness = Harness::new(false).await;

    // Responders register no codecs and create no initial offer.
    assert_eq!(harness.engine.defaults_registered.load(Ordering::SeqCst), 0);
    assert_eq!(harness.pc.offers(), 0);
    assert!(harness.emitted().is_empty());

    harness.signaller.negotiate().await;

    let emitted = harness.emitted();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].user_id, "local-peer");
    assert!(matches!(
        &emitted[0].signal,
        Signal::Renegotiate(r) if r.renegotiate
    ));
    assert_eq!(harness.pc.offers(), 0, "responder never creates offers");
}

#[tokio::test]
async fn test_responder_answers_remote_offer() {
    let harness = Harness::new(false).await;

    harness
        .signaller
        .signal(Payload::sdp(
            "remote-peer",
            SessionDescription::offer("v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n"),
        ))
        .await
        .unwrap();

    // Codec info was taken from the SDP before it was applied.
    assert_eq!(harness.engine.populated.lock().unwrap().len(), 1);

    let remotes = harness.pc.remote_descriptions.lock().unwrap().clone();
    assert_eq!(remotes.len(), 1);
    assert_eq!(remotes[0].typ, SdpType::Offer);

    let locals = harness.pc.local_descriptions.lock().unwrap().clone();
    assert_eq!(locals.len(), 1);
    assert_eq!(locals[0].typ, SdpType::Answer);

    let emitted = harness.emitted();
    assert_eq!(emitted.len(), 1);
    assert!(matches!(
        &emitted[0].signal,
        Signal::Sdp(sd) if sd.typ == SdpType::Answer
    ));
}

#[tokio::test]
async fn test_transceiver_request_only_from_responder() {
    let responder = Harness::new(false).await;
    responder
        .signaller
        .send_transceiver_request(TrackKind::Video, TransceiverDirection::Sendrecv);

    let emitted = responder.emitted();
    assert_eq!(emitted.len(), 1);
    assert!(matches!(&emitted[0].signal, Signal::TransceiverRequest(_)));

    let initiator = Harness::new(true).await;
    let before = initiator.emitted().len();
    initiator
        .signaller
        .send_transceiver_request(TrackKind::Video, TransceiverDirection::Sendrecv);
    assert_eq!(initiator.emitted().len(), before, "initiator no-op");
}

#[tokio::test]
async fn test_remote_candidate_applied() {
    let harness = Harness::new(true).await;

    let candidate = IceCandidateInit {
        candidate: "candidate:1 1 udp 1 10.0.0.1 1 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    };
    harness
        .signaller
        .signal(Payload::candidate("remote-peer", candidate.clone()))
        .await
        .unwrap();

    let applied = harness.pc.ice_candidates.lock().unwrap().clone();
    assert_eq!(applied, vec![candidate]);
}

#[tokio::test]
async fn test_local_candidates_forwarded_upstream() {
    let harness = Harness::new(true).await;
    let before = harness.emitted().len();

    let candidate = IceCandidateInit {
        candidate: "candidate:2 1 udp 1 10.0.0.2 2 typ host".to_string(),
        ..Default::default()
    };
    harness.pc.drive_candidate(Some(candidate));
    // End-of-gathering marker is not forwarded.
    harness.pc.drive_candidate(None);

    let emitted = harness.emitted();
    assert_eq!(emitted.len(), before + 1);
    let last = emitted.last().unwrap();
    assert_eq!(last.user_id, "local-peer");
    assert!(matches!(&last.signal, Signal::Candidate(_)));
}

#[tokio::test]
async fn test_ice_failure_closes_signaller_once() {
    let harness = Harness::new(true).await;
    assert!(!harness.signaller.is_closed());

    harness.pc.drive_ice_connection(IceConnectionState::Failed);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(harness.signaller.is_closed());
    assert_eq!(harness.pc.closed.load(Ordering::SeqCst), 1);

    // Close is latched: further triggers and explicit closes are no-ops.
    harness.pc.drive_ice_connection(IceConnectionState::Closed);
    harness.signaller.close().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.pc.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unexpected_signal_rejected() {
    let harness = Harness::new(true).await;

    let err = harness
        .signaller
        .signal(Payload::sdp(
            "remote-peer",
            SessionDescription {
                typ: SdpType::Pranswer,
                sdp: "v=0\r\n".to_string(),
            },
        ))
        .await;

    assert!(matches!(err, Err(peer_calls::Error::UnexpectedSignal(_))));
}
