/*!
The negotiation core: owns the signaling channel, the peer connection and local media of one
session and routes every event to the right step of the offer / answer exchange.

Events arrive on a single-threaded event loop in arbitrary order: the channel opening,
local capture finishing, signals from the other participant and callbacks of the native
peer connection. Each one is an entry point on [`NegotiationCoordinator`]; the ones that
may lead to `SDP` work are `async` and are driven by the caller's executor.
*/

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};

use anyhow::bail;
use coach_call_protocol::{IceCandidate, Role, SessionId, SignalMessage};
use log::{debug, error, info, warn};

use crate::config::{CallConfig, IceServer};
use crate::error::MediaError;
use crate::gatekeeper::{Action, Readiness};
use crate::media::{
    set_tracks_enabled, MediaAcquirer, MediaDevices, MediaStream, MediaTrack, TrackKind,
};
use crate::peer::{
    add_candidate_best_effort, NegotiationState, PeerConnection, PeerConnectionFactory,
    PeerConnectionManager, PeerConnectionState, PeerEventSink, SdpType, SignalingState,
};
use crate::signaling::{ChannelStatus, SignalTransport, SignalingChannel};

/// Platform objects a coordinator drives.
#[derive(Clone)]
pub struct Platform {
    pub transport: Rc<dyn SignalTransport>,
    pub devices: Rc<dyn MediaDevices>,
    pub peers: Rc<dyn PeerConnectionFactory>,
}

/// Local toggles, changed only by the user.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct MediaToggleState {
    pub muted: bool,
    pub video_off: bool,
    pub screen_sharing: bool,
}

/// Everything the presentation layer may depend on.
#[derive(Debug, Clone)]
pub struct CallView {
    pub state: NegotiationState,
    pub channel: ChannelStatus,
    pub local_stream: Option<Rc<dyn MediaStream>>,
    pub remote_stream: Option<Rc<dyn MediaStream>>,
    pub muted: bool,
    pub video_off: bool,
    pub screen_sharing: bool,
    /// Local capture failed; the session will not progress until it is recreated.
    pub media_error: Option<MediaError>,
    /// Short message for a toast, e.g. a refused screen share.
    pub notice: Option<String>,
}

type ChangeCallback = Box<dyn FnMut(&CallView)>;

struct CoordinatorInner {
    session_id: SessionId,
    ice_servers: Vec<IceServer>,
    readiness: Readiness,
    channel: SignalingChannel,
    channel_status: ChannelStatus,
    acquirer: MediaAcquirer,
    peer: PeerConnectionManager,
    state: NegotiationState,
    local_stream: Option<Rc<dyn MediaStream>>,
    remote_stream: Option<Rc<dyn MediaStream>>,
    screen_stream: Option<Rc<dyn MediaStream>>,
    /// Display capture waiting for the sender's track to be replaced.
    pending_screen_stream: Option<Rc<dyn MediaStream>>,
    toggles: MediaToggleState,
    screen_share_pending: bool,
    media_error: Option<MediaError>,
    notice: Option<String>,
    started: bool,
    left: bool,
    on_change: Option<ChangeCallback>,
    notifying: bool,
    notify_again: bool,
}

/// Negotiates one trainer ↔ trainee video session.
///
/// This class is a pointer to the underlying resource and can be cloned freely;
/// all clones drive the same session.
#[derive(Clone)]
pub struct NegotiationCoordinator {
    inner: Rc<RefCell<CoordinatorInner>>,
}

impl NegotiationCoordinator {
    #[must_use]
    pub fn new(config: &CallConfig, platform: Platform) -> Self {
        let Platform {
            transport,
            devices,
            peers,
        } = platform;
        Self {
            inner: Rc::new(RefCell::new(CoordinatorInner {
                session_id: config.session_id.clone(),
                ice_servers: config.connection_type.ice_servers(),
                readiness: Readiness::new(config.role),
                channel: SignalingChannel::new(config.session_id.clone(), transport),
                channel_status: ChannelStatus::Connecting,
                acquirer: MediaAcquirer::new(devices),
                peer: PeerConnectionManager::new(peers),
                state: NegotiationState::default(),
                local_stream: None,
                remote_stream: None,
                screen_stream: None,
                pending_screen_stream: None,
                toggles: MediaToggleState::default(),
                screen_share_pending: false,
                media_error: None,
                notice: None,
                started: false,
                left: false,
                on_change: None,
                notifying: false,
                notify_again: false,
            })),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.inner.borrow().readiness.role()
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.borrow().session_id.clone()
    }

    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.inner.borrow().readiness.clone()
    }

    #[must_use]
    pub fn toggles(&self) -> MediaToggleState {
        self.inner.borrow().toggles
    }

    #[must_use]
    pub fn view(&self) -> CallView {
        let inner = self.inner.borrow();
        CallView {
            state: inner.state,
            channel: inner.channel_status,
            local_stream: inner.local_stream.clone(),
            remote_stream: inner.remote_stream.clone(),
            muted: inner.toggles.muted,
            video_off: inner.toggles.video_off,
            screen_sharing: inner.toggles.screen_sharing,
            media_error: inner.media_error.clone(),
            notice: inner.notice.clone(),
        }
    }

    /// Register the single observer of [`CallView`] changes; a later registration replaces it.
    pub fn set_on_change(&self, callback: impl FnMut(&CallView) + 'static) {
        self.inner.borrow_mut().on_change = Some(Box::new(callback));
    }

    /// Deliver the current view. A change made by the observer itself is delivered once it
    /// returns.
    fn notify(&self) {
        let mut callback = {
            let mut inner = self.inner.borrow_mut();
            if inner.notifying {
                inner.notify_again = true;
                return;
            }
            let Some(callback) = inner.on_change.take() else {
                return;
            };
            inner.notifying = true;
            callback
        };
        loop {
            let view = self.view();
            callback(&view);
            let mut inner = self.inner.borrow_mut();
            if let Some(replacement) = inner.on_change.take() {
                callback = replacement;
            }
            if inner.notify_again {
                inner.notify_again = false;
                continue;
            }
            inner.notifying = false;
            inner.on_change = Some(callback);
            return;
        }
    }

    fn has_left(&self) -> bool {
        self.inner.borrow().left
    }

    fn channel(&self) -> SignalingChannel {
        self.inner.borrow().channel.clone()
    }

    /// Handle for callbacks that must not keep the session alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakCoordinator {
        WeakCoordinator {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn events(&self) -> Rc<dyn PeerEventSink> {
        Rc::new(CoordinatorEvents {
            coordinator: self.downgrade(),
        })
    }

    /// Begin local capture. Only the initiator sends media; for the responder this does nothing.
    pub async fn start(&self) {
        let acquirer = {
            let mut inner = self.inner.borrow_mut();
            if inner.started || inner.left {
                return;
            }
            inner.started = true;
            if inner.readiness.role() == Role::Responder {
                debug!("session {}: responder sends no local media", inner.session_id);
                return;
            }
            inner.acquirer.clone()
        };

        match acquirer.acquire().await {
            Ok(stream) => {
                {
                    let mut inner = self.inner.borrow_mut();
                    if inner.left {
                        info!("session left during capture, releasing local media");
                        stream.stop_all();
                        return;
                    }
                    let toggles = inner.toggles;
                    set_tracks_enabled(Some(&stream), TrackKind::Audio, !toggles.muted);
                    set_tracks_enabled(Some(&stream), TrackKind::Video, !toggles.video_off);
                    inner.local_stream = Some(stream);
                    inner.readiness.media_acquired();
                }
                self.notify();
                self.maybe_create_offer().await;
            }
            Err(err) => {
                error!("cannot start session without local media: {}", err);
                self.inner.borrow_mut().media_error = Some(err);
                self.notify();
            }
        }
    }

    /// The signaling channel finished its handshake.
    pub async fn handle_channel_open(&self) {
        let (channel, role) = {
            let mut inner = self.inner.borrow_mut();
            if inner.left {
                return;
            }
            info!("session {}: signaling channel open", inner.session_id);
            inner.channel_status = ChannelStatus::Open;
            inner.readiness.channel_opened();
            (inner.channel.clone(), inner.readiness.role())
        };
        channel.send(&SignalMessage::JoinSession);
        if role == Role::Responder {
            channel.send(&SignalMessage::Ready);
        }
        self.notify();
        self.maybe_create_offer().await;
    }

    /// The signaling channel closed or could not be opened. There is no automatic retry.
    pub fn handle_channel_closed(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.channel_status == ChannelStatus::Closed {
                return;
            }
            if !inner.left {
                warn!("session {}: signaling channel closed", inner.session_id);
            }
            inner.channel_status = ChannelStatus::Closed;
        }
        self.notify();
    }

    /// Raw frame received from the relay.
    pub async fn handle_text(&self, text: &str) {
        if let Some(message) = SignalingChannel::decode(text) {
            self.handle_signal(message).await;
        }
    }

    pub async fn handle_signal(&self, message: SignalMessage) {
        if self.has_left() {
            debug!("session already left, ignoring {}", message.kind());
            return;
        }
        let role = self.role();
        debug!("{} received {}", role, message.kind());
        match message {
            SignalMessage::Ready if role == Role::Initiator => {
                self.inner.borrow_mut().readiness.remote_announced();
                self.maybe_create_offer().await;
            }
            SignalMessage::UserJoined {
                role: Role::Responder,
            } if role == Role::Initiator => {
                self.inner.borrow_mut().readiness.remote_announced();
                self.maybe_create_offer().await;
            }
            SignalMessage::UserJoined {
                role: Role::Initiator,
            } if role == Role::Responder => {
                // the initiator may have joined after our first READY went nowhere
                self.channel().send(&SignalMessage::Ready);
            }
            SignalMessage::Offer { sdp } if role == Role::Responder => {
                self.answer_offer(&sdp).await;
            }
            SignalMessage::Answer { sdp } if role == Role::Initiator => {
                self.apply_answer(&sdp).await;
            }
            SignalMessage::IceCandidate { candidate } => {
                self.add_remote_candidate(candidate).await;
            }
            SignalMessage::Offer { .. } | SignalMessage::Answer { .. } => {
                warn!("{} ignoring {} meant for the other role", role, message.kind());
            }
            other => debug!("{} ignoring {}", role, other.kind()),
        }
    }

    /// Gatekeeper: creates and sends the offer once, when every readiness condition holds.
    async fn maybe_create_offer(&self) {
        let action = self.inner.borrow_mut().readiness.evaluate();
        let Some(Action::SendOffer) = action else {
            return;
        };
        match self.send_offer().await {
            Ok(()) => {
                self.inner.borrow_mut().readiness.offer_dispatched();
                info!("offer sent");
            }
            Err(err) => {
                error!("failed to create offer: {:?}", err);
                self.inner.borrow_mut().readiness.offer_failed();
            }
        }
    }

    async fn send_offer(&self) -> crate::Result<()> {
        let connection = self.ensure_connection()?;
        let offer = connection.create_offer().await?;
        connection
            .set_local_description(SdpType::Offer, &offer)
            .await?;
        if self.has_left() {
            bail!("session left while the offer was being created");
        }
        if !self.channel().send(&SignalMessage::Offer { sdp: offer }) {
            bail!("signaling channel refused the offer");
        }
        Ok(())
    }

    /// Create the peer connection if needed; the initiator's local tracks go on it right away
    /// so they are part of the offer.
    fn ensure_connection(&self) -> crate::Result<Rc<dyn PeerConnection>> {
        let events = self.events();
        let mut inner = self.inner.borrow_mut();
        let ice_servers = inner.ice_servers.clone();
        let connection = inner.peer.create(&ice_servers, events)?;
        if inner.readiness.role() == Role::Initiator {
            if let Some(stream) = inner.local_stream.clone() {
                inner.peer.attach_local_tracks(&stream)?;
            }
        }
        Ok(connection)
    }

    async fn answer_offer(&self, offer: &str) {
        let connection = match self.ensure_connection() {
            Ok(connection) => connection,
            Err(err) => {
                error!("cannot answer offer: {:?}", err);
                return;
            }
        };
        let answer = async {
            connection
                .set_remote_description(SdpType::Offer, offer)
                .await?;
            self.flush_pending_candidates(&connection).await;
            let answer = connection.create_answer().await?;
            connection
                .set_local_description(SdpType::Answer, &answer)
                .await?;
            crate::Result::Ok(answer)
        }
        .await;
        match answer {
            Ok(sdp) if !self.has_left() => {
                if self.channel().send(&SignalMessage::Answer { sdp }) {
                    info!("answer sent");
                }
            }
            Ok(_) => debug!("session left before the answer could be sent"),
            Err(err) => error!("failed to answer offer: {:?}", err),
        }
    }

    async fn apply_answer(&self, answer: &str) {
        let Some(connection) = self.inner.borrow().peer.connection() else {
            warn!("answer received before any offer was made, ignoring");
            return;
        };
        if connection.signaling_state() == SignalingState::Stable {
            warn!("duplicate answer received in stable state, ignoring");
            return;
        }
        match connection
            .set_remote_description(SdpType::Answer, answer)
            .await
        {
            Ok(()) => {
                debug!("remote answer applied");
                self.flush_pending_candidates(&connection).await;
            }
            Err(err) => warn!("failed to apply answer: {:?}", err),
        }
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) {
        let connection = {
            let mut inner = self.inner.borrow_mut();
            if inner.peer.is_closed() {
                return;
            }
            match inner.peer.ready_for_candidates() {
                Some(connection) => connection,
                None => {
                    inner.peer.queue_candidate(candidate);
                    return;
                }
            }
        };
        add_candidate_best_effort(&connection, &candidate).await;
    }

    async fn flush_pending_candidates(&self, connection: &Rc<dyn PeerConnection>) {
        let pending = self.inner.borrow_mut().peer.take_pending_candidates();
        if !pending.is_empty() {
            debug!("applying {} queued remote candidates", pending.len());
        }
        for candidate in &pending {
            add_candidate_best_effort(connection, candidate).await;
        }
    }

    /// Flip `enabled` on every local audio track. Returns the new muted state.
    pub fn toggle_mute(&self) -> bool {
        let muted = {
            let mut inner = self.inner.borrow_mut();
            let muted = !inner.toggles.muted;
            inner.toggles.muted = muted;
            set_tracks_enabled(inner.local_stream.as_ref(), TrackKind::Audio, !muted);
            muted
        };
        self.notify();
        muted
    }

    /// Flip `enabled` on every local video track. Returns the new video-off state.
    pub fn toggle_video(&self) -> bool {
        let video_off = {
            let mut inner = self.inner.borrow_mut();
            let video_off = !inner.toggles.video_off;
            inner.toggles.video_off = video_off;
            set_tracks_enabled(inner.local_stream.as_ref(), TrackKind::Video, !video_off);
            set_tracks_enabled(inner.screen_stream.as_ref(), TrackKind::Video, !video_off);
            set_tracks_enabled(
                inner.pending_screen_stream.as_ref(),
                TrackKind::Video,
                !video_off,
            );
            video_off
        };
        self.notify();
        video_off
    }

    /// Replace the outgoing camera track with a display capture, or restore the camera.
    pub async fn toggle_screen_share(&self) {
        let sharing = {
            let mut inner = self.inner.borrow_mut();
            if inner.left || inner.screen_share_pending {
                return;
            }
            inner.screen_share_pending = true;
            inner.toggles.screen_sharing
        };
        if sharing {
            self.stop_screen_share().await;
        } else {
            self.start_screen_share().await;
        }
        self.inner.borrow_mut().screen_share_pending = false;
        self.notify();
    }

    async fn start_screen_share(&self) {
        let outgoing = {
            let inner = self.inner.borrow();
            let has_camera = inner
                .local_stream
                .as_ref()
                .map_or(false, |stream| !stream.tracks_of(TrackKind::Video).is_empty());
            inner
                .peer
                .connection()
                .filter(|_| has_camera)
                .map(|connection| (connection, inner.acquirer.clone()))
        };
        let Some((connection, acquirer)) = outgoing else {
            self.set_notice("Screen sharing needs an active outgoing video");
            return;
        };

        let stream = match acquirer.acquire_display().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("display capture refused: {}", err);
                self.set_notice(&format!("Screen sharing unavailable: {err}"));
                return;
            }
        };
        let Some(track) = stream.tracks_of(TrackKind::Video).into_iter().next() else {
            stream.stop_all();
            self.set_notice("Screen capture has no video");
            return;
        };
        {
            let mut inner = self.inner.borrow_mut();
            if inner.left {
                stream.stop_all();
                return;
            }
            track.set_enabled(!inner.toggles.video_off);
            inner.pending_screen_stream = Some(Rc::clone(&stream));
        }
        let replaced = connection.replace_video_track(Rc::clone(&track)).await;
        self.inner.borrow_mut().pending_screen_stream = None;
        match replaced {
            Ok(()) => {
                {
                    let mut inner = self.inner.borrow_mut();
                    if inner.left {
                        info!("session left, releasing display capture");
                        stream.stop_all();
                        return;
                    }
                    info!("screen sharing started");
                    inner.screen_stream = Some(stream);
                    inner.toggles.screen_sharing = true;
                    inner.notice = None;
                }
                self.watch_screen_track(&track);
            }
            Err(err) => {
                warn!("failed to replace video track: {:?}", err);
                stream.stop_all();
                self.set_notice("Screen sharing failed");
            }
        }
    }

    async fn stop_screen_share(&self) {
        let (connection, camera, screen) = {
            let mut inner = self.inner.borrow_mut();
            inner.toggles.screen_sharing = false;
            let camera = inner
                .local_stream
                .as_ref()
                .and_then(|stream| stream.tracks_of(TrackKind::Video).into_iter().next());
            (inner.peer.connection(), camera, inner.screen_stream.take())
        };
        if let (Some(connection), Some(camera)) = (connection, camera) {
            if let Err(err) = connection.replace_video_track(camera).await {
                warn!("failed to restore camera track: {:?}", err);
            }
        }
        if let Some(screen) = screen {
            screen.stop_all();
        }
        info!("screen sharing stopped");
    }

    fn watch_screen_track(&self, track: &Rc<dyn MediaTrack>) {
        let weak = self.downgrade();
        let track_id = track.id();
        track.on_ended(Box::new(move || {
            Box::pin(async move {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.handle_screen_share_ended(&track_id).await;
                }
            }) as Pin<Box<dyn Future<Output = ()>>>
        }));
    }

    /// The display track was ended outside the app; the camera goes back on the connection.
    pub async fn handle_screen_share_ended(&self, track_id: &str) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.left || inner.screen_share_pending || !inner.toggles.screen_sharing {
                return;
            }
            let current = inner.screen_stream.as_ref().map_or(false, |stream| {
                stream.tracks().iter().any(|track| track.id() == track_id)
            });
            if !current {
                debug!("ignoring end of stale display track {}", track_id);
                return;
            }
            info!("display capture ended by the browser");
            inner.screen_share_pending = true;
        }
        self.stop_screen_share().await;
        self.inner.borrow_mut().screen_share_pending = false;
        self.notify();
    }

    fn set_notice(&self, notice: &str) {
        self.inner.borrow_mut().notice = Some(notice.to_owned());
    }

    /// Tear the session down: close the channel, close the peer connection, stop local tracks.
    /// Safe to call from any state and more than once; later events are ignored.
    pub fn leave(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.left {
                return;
            }
            inner.left = true;
            info!("leaving session {}", inner.session_id);

            inner.channel.close();
            inner.channel_status = ChannelStatus::Closed;

            inner.peer.close();
            inner.state = NegotiationState::Disconnected;

            if let Some(stream) = inner.local_stream.take() {
                stream.stop_all();
            }
            if let Some(stream) = inner.screen_stream.take() {
                stream.stop_all();
            }
            if let Some(stream) = inner.pending_screen_stream.take() {
                stream.stop_all();
            }
            inner.remote_stream = None;
            inner.toggles.screen_sharing = false;
        }
        self.notify();
    }
}

#[derive(Clone)]
pub struct WeakCoordinator {
    inner: Weak<RefCell<CoordinatorInner>>,
}

impl WeakCoordinator {
    #[must_use]
    pub fn upgrade(&self) -> Option<NegotiationCoordinator> {
        self.inner
            .upgrade()
            .map(|inner| NegotiationCoordinator { inner })
    }
}

/// Peer connection callbacks; holds the session weakly so the connection does not keep it alive.
struct CoordinatorEvents {
    coordinator: WeakCoordinator,
}

impl CoordinatorEvents {
    fn coordinator(&self) -> Option<NegotiationCoordinator> {
        let coordinator = self.coordinator.upgrade()?;
        (!coordinator.has_left()).then_some(coordinator)
    }
}

impl PeerEventSink for CoordinatorEvents {
    fn ice_candidate(&self, candidate: IceCandidate) {
        if let Some(coordinator) = self.coordinator() {
            debug!("local candidate: {}", candidate.candidate);
            coordinator
                .channel()
                .send(&SignalMessage::IceCandidate { candidate });
        }
    }

    fn remote_stream(&self, stream: Rc<dyn MediaStream>) {
        let Some(coordinator) = self.coordinator() else {
            return;
        };
        {
            let mut inner = coordinator.inner.borrow_mut();
            if !inner.peer.accept_remote_stream(&stream) {
                return;
            }
            info!("remote stream {} received", stream.id());
            inner.remote_stream = Some(stream);
        }
        coordinator.notify();
    }

    fn connection_state(&self, state: PeerConnectionState) {
        let Some(coordinator) = self.coordinator() else {
            return;
        };
        let state = NegotiationState::from(state);
        {
            let mut inner = coordinator.inner.borrow_mut();
            if inner.state == state {
                return;
            }
            match state {
                NegotiationState::Failed => {
                    error!("peer connection failed, a manual reconnect is required");
                }
                _ => info!("connection state: {:?}", state),
            }
            inner.state = state;
        }
        coordinator.notify();
    }
}
