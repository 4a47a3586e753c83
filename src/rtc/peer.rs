//! Production peer connections over webrtc-rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as EngineInternals;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::config::IceServerConfig;
use crate::rtc::{
    IceCandidateHandler, IceConnectionState, IceConnectionStateHandler, MediaEngine,
    PeerConnection, SignalingState, SignalingStateHandler,
};
use crate::signaling::payload::{
    IceCandidateInit, SdpType, SessionDescription, TrackKind, TransceiverDirection,
};
use crate::{Error, Result};

/// Builds production peer connections with default codecs and interceptors
/// registered, configured with the server's ICE servers.
pub struct PeerConnectionFactory {
    ice_servers: Vec<IceServerConfig>,
}

impl PeerConnectionFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self { ice_servers }
    }

    pub async fn create(&self) -> Result<Arc<RtcPeerConnection>> {
        let mut media_engine = EngineInternals::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(
            Default::default(),
            &mut media_engine,
        )
        .map_err(|e| Error::PeerConnectionError(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = self
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();

        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api.new_peer_connection(config).await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
        })?;

        Ok(Arc::new(RtcPeerConnection { pc: Arc::new(pc) }))
    }
}

/// [`PeerConnection`] backed by a webrtc-rs `RTCPeerConnection`
pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
}

impl RtcPeerConnection {
    pub fn inner(&self) -> Arc<RTCPeerConnection> {
        Arc::clone(&self.pc)
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    fn on_ice_candidate(&self, handler: IceCandidateHandler) {
        let handler = Arc::new(handler);
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let init = candidate.and_then(|c| c.to_json().ok()).map(candidate_init);
                    handler(init);
                })
            }));
    }

    fn on_signaling_state_change(&self, handler: SignalingStateHandler) {
        let handler = Arc::new(handler);
        self.pc
            .on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    if let Some(state) = signaling_state(state) {
                        handler(state);
                    }
                })
            }));
    }

    fn on_ice_connection_state_change(&self, handler: IceConnectionStateHandler) {
        let handler = Arc::new(handler);
        self.pc
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    if let Some(state) = ice_connection_state(state) {
                        handler(state);
                    }
                })
            }));
    }

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn add_transceiver_from_kind(
        &self,
        kind: TrackKind,
        direction: TransceiverDirection,
    ) -> Result<()> {
        let codec_type = match kind {
            TrackKind::Audio => RTPCodecType::Audio,
            TrackKind::Video => RTPCodecType::Video,
        };
        let init = RTCRtpTransceiverInit {
            direction: transceiver_direction(direction),
            send_encodings: Vec::new(),
        };

        self.pc
            .add_transceiver_from_kind(codec_type, Some(init))
            .await
            .map(|_| ())
            .map_err(|e| Error::PeerConnectionError(format!("Failed to add transceiver: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(rtc_description(description)?)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to set remote description: {}", e))
            })
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc
            .set_local_description(rtc_description(description)?)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to set local description: {}", e))
            })
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to create offer: {}", e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to create answer: {}", e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close: {}", e)))
    }
}

/// Production [`MediaEngine`] collaborator.
///
/// webrtc-rs registers the default codec set when the API is built (see
/// [`PeerConnectionFactory::create`]) and negotiates codec parameters from
/// the remote description internally, so this handle records the requested
/// registration and validates remote SDP instead of mutating a live engine.
pub struct RtcMediaEngine {
    defaults_registered: AtomicBool,
}

impl RtcMediaEngine {
    pub fn new() -> Self {
        Self {
            defaults_registered: AtomicBool::new(false),
        }
    }

    pub fn defaults_registered(&self) -> bool {
        self.defaults_registered.load(Ordering::SeqCst)
    }
}

impl Default for RtcMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for RtcMediaEngine {
    fn register_default_codecs(&self) -> Result<()> {
        self.defaults_registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn populate_from_sdp(&self, description: &SessionDescription) -> Result<()> {
        if !description.sdp.starts_with("v=") {
            return Err(Error::NegotiationError(
                "Invalid SDP: missing version line".to_string(),
            ));
        }
        if !description.sdp.contains("m=") {
            return Err(Error::NegotiationError(
                "Invalid SDP: no media sections".to_string(),
            ));
        }
        Ok(())
    }
}

fn candidate_init(init: RTCIceCandidateInit) -> IceCandidateInit {
    IceCandidateInit {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let result = match description.typ {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(Error::NegotiationError(
                "Rollback descriptions are not supported".to_string(),
            ))
        }
    };
    result.map_err(|e| Error::NegotiationError(format!("Invalid session description: {}", e)))
}

fn signaling_state(state: RTCSignalingState) -> Option<SignalingState> {
    match state {
        RTCSignalingState::Stable => Some(SignalingState::Stable),
        RTCSignalingState::HaveLocalOffer => Some(SignalingState::HaveLocalOffer),
        RTCSignalingState::HaveRemoteOffer => Some(SignalingState::HaveRemoteOffer),
        RTCSignalingState::HaveLocalPranswer => Some(SignalingState::HaveLocalPranswer),
        RTCSignalingState::HaveRemotePranswer => Some(SignalingState::HaveRemotePranswer),
        RTCSignalingState::Closed => Some(SignalingState::Closed),
        RTCSignalingState::Unspecified => None,
    }
}

fn ice_connection_state(state: RTCIceConnectionState) -> Option<IceConnectionState> {
    match state {
        RTCIceConnectionState::New => Some(IceConnectionState::New),
        RTCIceConnectionState::Checking => Some(IceConnectionState::Checking),
        RTCIceConnectionState::Connected => Some(IceConnectionState::Connected),
        RTCIceConnectionState::Completed => Some(IceConnectionState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceConnectionState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceConnectionState::Failed),
        RTCIceConnectionState::Closed => Some(IceConnectionState::Closed),
        RTCIceConnectionState::Unspecified => None,
    }
}

fn transceiver_direction(direction: TransceiverDirection) -> RTCRtpTransceiverDirection {
    match direction {
        TransceiverDirection::Sendrecv => RTCRtpTransceiverDirection::Sendrecv,
        TransceiverDirection::Sendonly => RTCRtpTransceiverDirection::Sendonly,
        TransceiverDirection::Recvonly => RTCRtpTransceiverDirection::Recvonly,
        TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
    }
}
