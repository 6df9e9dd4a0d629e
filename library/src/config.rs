use anyhow::anyhow;
use coach_call_protocol::{Role, SessionId};
use url::Url;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Single entry of the peer connection's `iceServers` list.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    fn stun(urls: &str) -> Self {
        Self {
            urls: vec![urls.to_owned()],
            username: None,
            credential: None,
        }
    }
}

/// Specifies what kind of peer connection to create
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionType {
    /// Within local network
    Local,
    /// Setup with STUN server, WAN capabilities but can fail
    Stun { urls: String },
    /// Setup with STUN and TURN servers, will fallback to TURN if needed, most stable connection
    StunAndTurn {
        stun_urls: String,
        turn_urls: String,
        username: String,
        credential: String,
    },
}

impl Default for ConnectionType {
    fn default() -> Self {
        Self::Stun {
            urls: DEFAULT_STUN_SERVER.to_owned(),
        }
    }
}

impl ConnectionType {
    #[must_use]
    pub fn ice_servers(&self) -> Vec<IceServer> {
        match self {
            Self::Local => Vec::new(),
            Self::Stun { urls } => vec![IceServer::stun(urls)],
            Self::StunAndTurn {
                stun_urls,
                turn_urls,
                username,
                credential,
            } => vec![
                IceServer::stun(stun_urls),
                IceServer {
                    urls: vec![turn_urls.clone()],
                    username: Some(username.clone()),
                    credential: Some(credential.clone()),
                },
            ],
        }
    }
}

/// Everything needed to take part in one video session.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Base address of the relay, e.g. `wss://example.com/ws/session`.
    pub signaling_url: String,
    pub session_id: SessionId,
    /// Bearer token passed to the relay during the handshake.
    pub auth_token: String,
    pub role: Role,
    pub connection_type: ConnectionType,
}

impl CallConfig {
    #[must_use]
    pub fn new(
        signaling_url: impl Into<String>,
        session_id: SessionId,
        auth_token: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            signaling_url: signaling_url.into(),
            session_id,
            auth_token: auth_token.into(),
            role,
            connection_type: ConnectionType::default(),
        }
    }

    #[must_use]
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    /// Full relay address for this session: `<base>/<session id>?token=..&role=..`.
    ///
    /// # Errors
    /// Fails if the base address is not a valid URL or cannot carry a path.
    pub fn signaling_endpoint(&self) -> crate::Result<Url> {
        let mut url = Url::parse(&self.signaling_url)
            .map_err(|err| anyhow!("invalid signaling url {}: {}", self.signaling_url, err))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("signaling url cannot be a base: {}", self.signaling_url))?
            .pop_if_empty()
            .push(self.session_id.as_str());
        url.query_pairs_mut()
            .append_pair("token", &self.auth_token)
            .append_pair("role", self.role.as_str());
        Ok(url)
    }
}
