use std::collections::HashSet;
use std::rc::Rc;

use anyhow::anyhow;
use async_trait::async_trait;
use coach_call_protocol::IceCandidate;
use log::{debug, info, warn};

use crate::config::IceServer;
use crate::media::{MediaStream, MediaTrack};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SdpType {
    Offer,
    Answer,
}

/// `RTCSignalingState`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// `RTCPeerConnectionState`
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Connection health shown to the UI, derived only from [`PeerConnectionState`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum NegotiationState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl From<PeerConnectionState> for NegotiationState {
    fn from(state: PeerConnectionState) -> Self {
        match state {
            PeerConnectionState::New | PeerConnectionState::Connecting => Self::Connecting,
            PeerConnectionState::Connected => Self::Connected,
            PeerConnectionState::Disconnected | PeerConnectionState::Closed => Self::Disconnected,
            PeerConnectionState::Failed => Self::Failed,
        }
    }
}

/// The native peer connection (`RTCPeerConnection` in the browser).
#[async_trait(?Send)]
pub trait PeerConnection {
    async fn create_offer(&self) -> crate::Result<String>;
    async fn create_answer(&self) -> crate::Result<String>;
    async fn set_local_description(&self, kind: SdpType, sdp: &str) -> crate::Result<()>;
    async fn set_remote_description(&self, kind: SdpType, sdp: &str) -> crate::Result<()>;
    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> crate::Result<()>;
    /// Swap the track on the sender currently carrying video.
    async fn replace_video_track(&self, track: Rc<dyn MediaTrack>) -> crate::Result<()>;
    /// # Errors
    /// The connection refused the track, e.g. because it is closed.
    fn add_track(&self, track: Rc<dyn MediaTrack>, stream: &Rc<dyn MediaStream>)
        -> crate::Result<()>;
    fn signaling_state(&self) -> SignalingState;
    fn has_remote_description(&self) -> bool;
    fn close(&self);
}

/// Callbacks the native connection fires on its own schedule.
pub trait PeerEventSink {
    fn ice_candidate(&self, candidate: IceCandidate);
    fn remote_stream(&self, stream: Rc<dyn MediaStream>);
    fn connection_state(&self, state: PeerConnectionState);
}

pub trait PeerConnectionFactory {
    /// Build a connection whose events are delivered to `events`.
    ///
    /// # Errors
    /// The platform could not create a peer connection with given configuration.
    fn create(
        &self,
        ice_servers: &[IceServer],
        events: Rc<dyn PeerEventSink>,
    ) -> crate::Result<Rc<dyn PeerConnection>>;
}

/// Owns the single peer connection of a session together with its track and candidate plumbing.
pub struct PeerConnectionManager {
    factory: Rc<dyn PeerConnectionFactory>,
    connection: Option<Rc<dyn PeerConnection>>,
    local_tracks: Vec<Rc<dyn MediaTrack>>,
    tracks_attached: bool,
    pending_candidates: Vec<IceCandidate>,
    remote_streams: HashSet<String>,
    closed: bool,
}

impl PeerConnectionManager {
    #[must_use]
    pub fn new(factory: Rc<dyn PeerConnectionFactory>) -> Self {
        Self {
            factory,
            connection: None,
            local_tracks: Vec::new(),
            tracks_attached: false,
            pending_candidates: Vec::new(),
            remote_streams: HashSet::new(),
            closed: false,
        }
    }

    /// Create the connection unless one already exists.
    ///
    /// # Errors
    /// The manager was closed or the platform refused to create the connection.
    pub fn create(
        &mut self,
        ice_servers: &[IceServer],
        events: Rc<dyn PeerEventSink>,
    ) -> crate::Result<Rc<dyn PeerConnection>> {
        if self.closed {
            return Err(anyhow!("peer connection manager is closed"));
        }
        if let Some(connection) = &self.connection {
            return Ok(Rc::clone(connection));
        }
        let connection = self.factory.create(ice_servers, events)?;
        info!("peer connection created with {} ICE servers", ice_servers.len());
        self.connection = Some(Rc::clone(&connection));
        Ok(connection)
    }

    #[must_use]
    pub fn connection(&self) -> Option<Rc<dyn PeerConnection>> {
        self.connection.clone()
    }

    /// Attach every track of the local stream. Only the first call has an effect.
    ///
    /// # Errors
    /// No connection was created yet or the connection refused a track.
    pub fn attach_local_tracks(&mut self, stream: &Rc<dyn MediaStream>) -> crate::Result<()> {
        if self.tracks_attached {
            debug!("local tracks already attached");
            return Ok(());
        }
        let connection = self
            .connection
            .clone()
            .ok_or_else(|| anyhow!("no peer connection to attach local tracks to"))?;
        for track in stream.tracks() {
            connection.add_track(Rc::clone(&track), stream)?;
            debug!("attached local {:?} track {}", track.kind(), track.id());
            self.local_tracks.push(track);
        }
        self.tracks_attached = true;
        Ok(())
    }

    /// Whether this remote stream is new; the stream id is the dedup key.
    pub fn accept_remote_stream(&mut self, stream: &Rc<dyn MediaStream>) -> bool {
        !self.closed && self.remote_streams.insert(stream.id())
    }

    /// Candidates that cannot be applied yet are parked until
    /// [`take_pending_candidates`](Self::take_pending_candidates).
    #[must_use]
    pub fn ready_for_candidates(&self) -> Option<Rc<dyn PeerConnection>> {
        self.connection
            .as_ref()
            .filter(|connection| connection.has_remote_description())
            .cloned()
    }

    pub fn queue_candidate(&mut self, candidate: IceCandidate) {
        if self.closed {
            return;
        }
        debug!(
            "queueing remote candidate until remote description is set ({} queued)",
            self.pending_candidates.len() + 1
        );
        self.pending_candidates.push(candidate);
    }

    pub fn take_pending_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop attached local tracks and close the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for track in self.local_tracks.drain(..) {
            track.stop();
        }
        self.pending_candidates.clear();
        if let Some(connection) = self.connection.take() {
            connection.close();
            info!("peer connection closed");
        }
    }
}

/// Apply a remote candidate, logging instead of failing.
pub(crate) async fn add_candidate_best_effort(
    connection: &Rc<dyn PeerConnection>,
    candidate: &IceCandidate,
) {
    match connection.add_ice_candidate(candidate).await {
        Ok(()) => debug!("added ICE candidate {}", candidate.candidate),
        Err(err) => warn!("failed to add ICE candidate {}: {:?}", candidate.candidate, err),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn native_states_map_to_negotiation_states() {
        use PeerConnectionState as Native;
        let expected = [
            (Native::New, NegotiationState::Connecting),
            (Native::Connecting, NegotiationState::Connecting),
            (Native::Connected, NegotiationState::Connected),
            (Native::Disconnected, NegotiationState::Disconnected),
            (Native::Failed, NegotiationState::Failed),
            (Native::Closed, NegotiationState::Disconnected),
        ];
        for (native, state) in expected {
            assert_eq!(NegotiationState::from(native), state);
        }
        assert_eq!(NegotiationState::default(), NegotiationState::Disconnected);
    }
}
