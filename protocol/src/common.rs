use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique identifier of a video session that both participants provide
/// when connecting to the relay.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap String into a `SessionId` `struct`
    #[must_use]
    pub const fn new(inner: String) -> Self {
        Self(inner)
    }

    /// Return reference to the underling string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Acquire the underlying type
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl FromStr for SessionId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the session a participant plays.
///
/// The initiator (the trainer) acquires camera and microphone and creates the offer,
/// the responder (the trainee) only answers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Creates the `SDP` offer and sends outbound media.
    #[serde(alias = "trainer")]
    Initiator,
    /// Answers the offer, receives media only.
    #[serde(alias = "trainee")]
    Responder,
}

impl Role {
    /// The role held by the other participant of the session.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }

    /// Lowercase name used on the wire and in query strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Responder => "responder",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiator" | "trainer" => Ok(Self::Initiator),
            "responder" | "trainee" => Ok(Self::Responder),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Proposed ICE Candidate in the shape browsers produce with `RTCIceCandidate.toJSON()`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The `candidate:` attribute line.
    pub candidate: String,
    /// Media stream identification tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    /// ICE username fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn role_accepts_product_aliases() {
        let role: Role = serde_json::from_str("\"trainer\"").unwrap();
        assert_eq!(role, Role::Initiator);
        let role: Role = serde_json::from_str("\"trainee\"").unwrap();
        assert_eq!(role, Role::Responder);
        assert_eq!(serde_json::to_string(&Role::Responder).unwrap(), "\"responder\"");
    }

    #[test]
    fn role_parses_from_query_values() {
        assert_eq!("initiator".parse::<Role>(), Ok(Role::Initiator));
        assert_eq!("trainee".parse::<Role>(), Ok(Role::Responder));
        assert!("coach".parse::<Role>().is_err());
        assert_eq!(Role::Initiator.other(), Role::Responder);
    }

    #[test]
    fn ice_candidate_uses_browser_field_names() {
        let json = r#"{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host","sdpMid":"0","sdpMLineIndex":0}"#;
        let candidate: IceCandidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_m_line_index, Some(0));
        assert_eq!(candidate.username_fragment, None);
        assert_eq!(serde_json::to_string(&candidate).unwrap(), json);
    }
}
