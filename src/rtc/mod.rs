//! Peer-connection seam
//!
//! The signaller and negotiator drive WebRTC through the [`PeerConnection`]
//! and [`MediaEngine`] traits rather than the webrtc-rs types directly.
//! That keeps the negotiation logic testable against fakes that record
//! calls and drive the callbacks; [`peer`] provides the production
//! implementations.

pub mod peer;

use async_trait::async_trait;

use crate::signaling::payload::{
    IceCandidateInit, SessionDescription, TrackKind, TransceiverDirection,
};
use crate::Result;

pub use peer::{PeerConnectionFactory, RtcMediaEngine, RtcPeerConnection};

/// Invoked with each locally gathered ICE candidate; `None` signals the end
/// of gathering.
pub type IceCandidateHandler = Box<dyn Fn(Option<IceCandidateInit>) + Send + Sync>;

pub type SignalingStateHandler = Box<dyn Fn(SignalingState) + Send + Sync>;

pub type IceConnectionStateHandler = Box<dyn Fn(IceConnectionState) + Send + Sync>;

/// SDP negotiation state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// ICE transport state of a peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Capability set the signaller consumes from a peer connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn on_ice_candidate(&self, handler: IceCandidateHandler);

    fn on_signaling_state_change(&self, handler: SignalingStateHandler);

    fn on_ice_connection_state_change(&self, handler: IceConnectionStateHandler);

    async fn add_ice_candidate(&self, candidate: IceCandidateInit) -> Result<()>;

    async fn add_transceiver_from_kind(
        &self,
        kind: TrackKind,
        direction: TransceiverDirection,
    ) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn close(&self) -> Result<()>;
}

/// Media engine collaborator of the signaller
pub trait MediaEngine: Send + Sync {
    /// Register the default codec set before the first offer.
    fn register_default_codecs(&self) -> Result<()>;

    /// Take codec parameters from a remote session description.
    fn populate_from_sdp(&self, description: &SessionDescription) -> Result<()>;
}
