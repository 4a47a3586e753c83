//! WebRTC signaling: payload types, negotiation state machine, signaller

pub mod negotiator;
pub mod payload;
pub mod signaller;

pub use negotiator::{Negotiator, OnOffer, OnRequestNegotiation, TransceiverRequest};
pub use payload::{
    CandidateSignal, IceCandidateInit, Payload, RenegotiateSignal, SdpType, SessionDescription,
    Signal, TrackKind, TransceiverDirection, TransceiverInit, TransceiverRequestBody,
    TransceiverRequestSignal,
};
pub use signaller::{OnSignal, Signaller};
