/*!
Signaling messages exchanged between coach-call peers and the relay.
 */

use serde::{Deserialize, Serialize};

use crate::common::{IceCandidate, Role};

/// `Enum` consisting of two main categories: messages used to announce presence in a session
/// and messages used to set up the `WebRTC` connection afterwards.
///
/// The session itself is identified by the relay endpoint each participant connected to,
/// so none of the messages repeat the [`SessionId`](crate::SessionId).
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalMessage {
    /// Participant announcing itself to the relay right after its channel opened
    JoinSession,

    /// Responder telling the initiator it is able to receive an offer
    Ready,

    /// Relay notifying that a participant with given role is present in the session
    UserJoined {
        /// Role of the participant that joined
        role: Role,
    },

    /// `SDP` Offer that gets passed to the other participant without modifications
    Offer {
        /// Session description payload
        sdp: String,
    },

    /// `SDP` Answer that gets passed to the other participant without modifications
    Answer {
        /// Session description payload
        sdp: String,
    },

    /// Proposed ICE Candidate passed to the other participant without modifications
    IceCandidate {
        /// The candidate as produced by the sender's peer connection
        candidate: IceCandidate,
    },

    /// Any message with a `type` this version does not know, ignored by receivers
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    /// Wire name of the message type, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::JoinSession => "JOIN_SESSION",
            Self::Ready => "READY",
            Self::UserJoined { .. } => "USER_JOINED",
            Self::Offer { .. } => "OFFER",
            Self::Answer { .. } => "ANSWER",
            Self::IceCandidate { .. } => "ICE_CANDIDATE",
            Self::Unknown => "UNKNOWN",
        }
    }
}
