//! Signaling payload types
//!
//! The payload of a `signal` message is a discriminated union exchanged
//! between two peers: `{"userID": ..., "signal": {...}}` where the inner
//! signal is an ICE candidate, a renegotiation request, a transceiver
//! request, or an SDP session description. The union is discriminated by
//! structure, so it maps onto an untagged serde enum, validated once at
//! deserialization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// A signaling envelope between two peers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    /// Peer the signal originates from (rewritten to the sender on relay)
    #[serde(rename = "userID")]
    pub user_id: String,

    /// The signal variant
    pub signal: Signal,
}

/// Signal variants carried by a [`Payload`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Signal {
    /// Trickled ICE candidate: `{"candidate": {...}}`
    Candidate(CandidateSignal),

    /// Renegotiation request from a responder: `{"renegotiate": true}`
    Renegotiate(RenegotiateSignal),

    /// Request for the initiator to add a transceiver:
    /// `{"transceiverRequest": {"kind": ...}}`
    TransceiverRequest(TransceiverRequestSignal),

    /// SDP offer or answer: `{"type": ..., "sdp": ...}`
    Sdp(SessionDescription),
}

/// ICE candidate wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateSignal {
    pub candidate: IceCandidateInit,
}

/// Renegotiation request wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenegotiateSignal {
    pub renegotiate: bool,
}

/// Transceiver request wrapper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransceiverRequestSignal {
    #[serde(rename = "transceiverRequest")]
    pub transceiver_request: TransceiverRequestBody,
}

/// The requested transceiver: a media kind and an optional direction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransceiverRequestBody {
    pub kind: TrackKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<TransceiverInit>,
}

/// Transceiver init options carried on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransceiverInit {
    pub direction: TransceiverDirection,
}

/// ICE candidate attributes, mirroring `RTCIceCandidateInit`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IceCandidateInit {
    pub candidate: String,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

/// An SDP session description
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub typ: SdpType,

    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            typ: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            typ: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// SDP description type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Media kind of a track or transceiver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Transceiver direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    Sendrecv,
    Sendonly,
    Recvonly,
    Inactive,
}

impl Payload {
    /// Candidate payload
    pub fn candidate(user_id: impl Into<String>, candidate: IceCandidateInit) -> Self {
        Self {
            user_id: user_id.into(),
            signal: Signal::Candidate(CandidateSignal { candidate }),
        }
    }

    /// Renegotiation request payload
    pub fn renegotiate(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            signal: Signal::Renegotiate(RenegotiateSignal { renegotiate: true }),
        }
    }

    /// Transceiver request payload
    pub fn transceiver_request(
        user_id: impl Into<String>,
        kind: TrackKind,
        direction: TransceiverDirection,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            signal: Signal::TransceiverRequest(TransceiverRequestSignal {
                transceiver_request: TransceiverRequestBody {
                    kind,
                    init: Some(TransceiverInit { direction }),
                },
            }),
        }
    }

    /// SDP payload
    pub fn sdp(user_id: impl Into<String>, description: SessionDescription) -> Self {
        Self {
            user_id: user_id.into(),
            signal: Signal::Sdp(description),
        }
    }

    /// Parse a payload out of a message's JSON value
    pub fn from_value(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::MalformedFrame(format!("Invalid signal payload: {}", e)))
    }

    /// Convert back into a JSON value for embedding in a message
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self)
            .map_err(|e| Error::SerializationError(format!("Invalid signal payload: {}", e)))
    }
}
