//! In-memory platform used to drive a coordinator without a browser.

#![allow(dead_code)]

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use anyhow::bail;
use async_trait::async_trait;
use coach_call::media::{EndedHandler, MediaDevices, MediaStream, MediaTrack, TrackKind};
use coach_call::peer::{
    PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEventSink, SdpType,
    SignalingState,
};
use coach_call::signaling::SignalTransport;
use coach_call::{
    CallConfig, CallView, ConnectionType, IceCandidate, IceServer, MediaError,
    NegotiationCoordinator, Platform, Role, SessionId, SignalMessage,
};
use tokio::sync::oneshot;

pub const OFFER_SDP: &str = "v=0 offer";
pub const ANSWER_SDP: &str = "v=0 answer";

pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    pub enabled: Cell<bool>,
    pub ended: Cell<bool>,
    ended_handler: RefCell<Option<EndedHandler>>,
}

impl fmt::Debug for FakeTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind) -> Rc<Self> {
        Rc::new(Self {
            id: id.to_owned(),
            kind,
            enabled: Cell::new(true),
            ended: Cell::new(false),
            ended_handler: RefCell::new(None),
        })
    }

    /// The user agent ends the track, e.g. through the browser's "Stop sharing" button.
    pub async fn end_externally(&self) {
        self.ended.set(true);
        let handler = self.ended_handler.borrow_mut().take();
        if let Some(handler) = handler {
            handler().await;
        }
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.enabled.get()
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    fn stop(&self) {
        self.ended.set(true);
    }

    fn is_ended(&self) -> bool {
        self.ended.get()
    }

    fn on_ended(&self, handler: EndedHandler) {
        *self.ended_handler.borrow_mut() = Some(handler);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct FakeStream {
    id: String,
    pub tracks: Vec<Rc<FakeTrack>>,
}

impl FakeStream {
    /// Camera + microphone stream.
    pub fn camera(id: &str) -> Rc<Self> {
        Rc::new(Self {
            id: id.to_owned(),
            tracks: vec![
                FakeTrack::new(&format!("{id}-audio"), TrackKind::Audio),
                FakeTrack::new(&format!("{id}-video"), TrackKind::Video),
            ],
        })
    }

    pub fn display(id: &str) -> Rc<Self> {
        Rc::new(Self {
            id: id.to_owned(),
            tracks: vec![FakeTrack::new(&format!("{id}-screen"), TrackKind::Video)],
        })
    }

    pub fn all_ended(&self) -> bool {
        self.tracks.iter().all(|track| track.is_ended())
    }

    pub fn track(&self, kind: TrackKind) -> Rc<FakeTrack> {
        self.tracks
            .iter()
            .find(|track| track.kind == kind)
            .cloned()
            .unwrap()
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|track| Rc::clone(track) as Rc<dyn MediaTrack>)
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
pub struct FakeDevices {
    pub user_media_error: RefCell<Option<MediaError>>,
    pub display_media_error: RefCell<Option<MediaError>>,
    pub cameras: RefCell<Vec<Rc<FakeStream>>>,
    pub displays: RefCell<Vec<Rc<FakeStream>>>,
    hold: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakeDevices {
    /// Keep the next camera request pending until the returned sender fires.
    pub fn hold_user_media(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        *self.hold.borrow_mut() = Some(receiver);
        sender
    }

    pub fn camera(&self) -> Rc<FakeStream> {
        self.cameras.borrow().last().cloned().unwrap()
    }

    pub fn display(&self) -> Rc<FakeStream> {
        self.displays.borrow().last().cloned().unwrap()
    }
}

#[async_trait(?Send)]
impl MediaDevices for FakeDevices {
    async fn get_user_media(&self) -> Result<Rc<dyn MediaStream>, MediaError> {
        let hold = self.hold.borrow_mut().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        if let Some(err) = self.user_media_error.borrow().clone() {
            return Err(err);
        }
        let stream = FakeStream::camera(&format!("camera-{}", self.cameras.borrow().len()));
        self.cameras.borrow_mut().push(Rc::clone(&stream));
        Ok(stream)
    }

    async fn get_display_media(&self) -> Result<Rc<dyn MediaStream>, MediaError> {
        if let Some(err) = self.display_media_error.borrow().clone() {
            return Err(err);
        }
        let stream = FakeStream::display(&format!("display-{}", self.displays.borrow().len()));
        self.displays.borrow_mut().push(Rc::clone(&stream));
        Ok(stream)
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub open: Cell<bool>,
    pub sent: RefCell<Vec<String>>,
    pub close_count: Cell<usize>,
}

impl FakeTransport {
    pub fn messages(&self) -> Vec<SignalMessage> {
        self.sent
            .borrow()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.messages()
            .iter()
            .filter(|message| message.kind() == kind)
            .count()
    }

    pub fn clear(&self) {
        self.sent.borrow_mut().clear();
    }
}

impl SignalTransport for FakeTransport {
    fn send_text(&self, text: &str) -> coach_call::Result<()> {
        if !self.open.get() {
            bail!("transport closed");
        }
        self.sent.borrow_mut().push(text.to_owned());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn close(&self) {
        self.open.set(false);
        self.close_count.set(self.close_count.get() + 1);
    }
}

pub struct FakePeer {
    pub events: Rc<dyn PeerEventSink>,
    pub ice_servers: Vec<IceServer>,
    pub ops: RefCell<Vec<String>>,
    pub signaling_state: Cell<SignalingState>,
    pub remote_description: Cell<bool>,
    pub fail_create_offer: Cell<bool>,
    pub fail_replace_track: Cell<bool>,
    pub added_tracks: RefCell<Vec<String>>,
    pub candidates: RefCell<Vec<IceCandidate>>,
    pub video_track: RefCell<Option<Rc<dyn MediaTrack>>>,
    pub closed: Cell<bool>,
    offer_hold: RefCell<Option<oneshot::Receiver<()>>>,
    replace_hold: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakePeer {
    fn record(&self, op: &str) {
        self.ops.borrow_mut().push(op.to_owned());
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.borrow().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.ops.borrow().iter().filter(|recorded| *recorded == op).count()
    }

    pub fn video_track_id(&self) -> Option<String> {
        self.video_track.borrow().as_ref().map(|track| track.id())
    }

    pub fn fire_state(&self, state: PeerConnectionState) {
        self.events.connection_state(state);
    }

    /// Keep the next track replacement pending until the returned sender fires.
    pub fn hold_replace_track(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        *self.replace_hold.borrow_mut() = Some(receiver);
        sender
    }
}

#[async_trait(?Send)]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> coach_call::Result<String> {
        self.record("create_offer");
        let hold = self.offer_hold.borrow_mut().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        if self.fail_create_offer.get() {
            bail!("createOffer rejected");
        }
        Ok(OFFER_SDP.to_owned())
    }

    async fn create_answer(&self) -> coach_call::Result<String> {
        self.record("create_answer");
        if self.signaling_state.get() != SignalingState::HaveRemoteOffer {
            bail!("no remote offer to answer");
        }
        Ok(ANSWER_SDP.to_owned())
    }

    async fn set_local_description(&self, kind: SdpType, _sdp: &str) -> coach_call::Result<()> {
        self.record(&format!("set_local_description:{kind:?}"));
        let next = match kind {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            SdpType::Answer => SignalingState::Stable,
        };
        self.signaling_state.set(next);
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpType, _sdp: &str) -> coach_call::Result<()> {
        self.record(&format!("set_remote_description:{kind:?}"));
        match kind {
            SdpType::Offer => self.signaling_state.set(SignalingState::HaveRemoteOffer),
            SdpType::Answer => {
                if self.signaling_state.get() != SignalingState::HaveLocalOffer {
                    bail!("answer in wrong state");
                }
                self.signaling_state.set(SignalingState::Stable);
            }
        }
        self.remote_description.set(true);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> coach_call::Result<()> {
        self.record("add_ice_candidate");
        if !self.remote_description.get() {
            bail!("candidate before remote description");
        }
        self.candidates.borrow_mut().push(candidate.clone());
        Ok(())
    }

    async fn replace_video_track(&self, track: Rc<dyn MediaTrack>) -> coach_call::Result<()> {
        self.record("replace_video_track");
        let hold = self.replace_hold.borrow_mut().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        if self.fail_replace_track.get() {
            bail!("replaceTrack rejected");
        }
        *self.video_track.borrow_mut() = Some(track);
        Ok(())
    }

    fn add_track(
        &self,
        track: Rc<dyn MediaTrack>,
        _stream: &Rc<dyn MediaStream>,
    ) -> coach_call::Result<()> {
        self.record("add_track");
        self.added_tracks.borrow_mut().push(track.id());
        if track.kind() == TrackKind::Video {
            *self.video_track.borrow_mut() = Some(track);
        }
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.signaling_state.get()
    }

    fn has_remote_description(&self) -> bool {
        self.remote_description.get()
    }

    fn close(&self) {
        self.record("close");
        self.closed.set(true);
        self.signaling_state.set(SignalingState::Closed);
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub created: RefCell<Vec<Rc<FakePeer>>>,
    pub fail_create_offer: Cell<bool>,
    offer_hold: RefCell<Option<oneshot::Receiver<()>>>,
}

impl FakeFactory {
    /// Keep the first offer of the next connection pending until the returned sender fires.
    pub fn hold_create_offer(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        *self.offer_hold.borrow_mut() = Some(receiver);
        sender
    }
}

impl PeerConnectionFactory for FakeFactory {
    fn create(
        &self,
        ice_servers: &[IceServer],
        events: Rc<dyn PeerEventSink>,
    ) -> coach_call::Result<Rc<dyn PeerConnection>> {
        let peer = Rc::new(FakePeer {
            events,
            ice_servers: ice_servers.to_vec(),
            ops: RefCell::new(Vec::new()),
            signaling_state: Cell::new(SignalingState::Stable),
            remote_description: Cell::new(false),
            fail_create_offer: Cell::new(self.fail_create_offer.get()),
            fail_replace_track: Cell::new(false),
            added_tracks: RefCell::new(Vec::new()),
            candidates: RefCell::new(Vec::new()),
            video_track: RefCell::new(None),
            closed: Cell::new(false),
            offer_hold: RefCell::new(self.offer_hold.borrow_mut().take()),
            replace_hold: RefCell::new(None),
        });
        self.created.borrow_mut().push(Rc::clone(&peer));
        Ok(peer)
    }
}

/// One participant wired to fakes, recording every view it publishes.
pub struct Harness {
    pub transport: Rc<FakeTransport>,
    pub devices: Rc<FakeDevices>,
    pub factory: Rc<FakeFactory>,
    pub coordinator: NegotiationCoordinator,
    pub views: Rc<RefCell<Vec<CallView>>>,
}

impl Harness {
    pub fn new(role: Role) -> Self {
        let config = CallConfig::new(
            "wss://relay.test/session",
            SessionId::new("session-1".to_owned()),
            "token",
            role,
        )
        .with_connection_type(ConnectionType::Local);
        let transport = Rc::new(FakeTransport::default());
        let devices = Rc::new(FakeDevices::default());
        let factory = Rc::new(FakeFactory::default());
        let coordinator = NegotiationCoordinator::new(
            &config,
            Platform {
                transport: Rc::clone(&transport) as Rc<dyn SignalTransport>,
                devices: Rc::clone(&devices) as Rc<dyn MediaDevices>,
                peers: Rc::clone(&factory) as Rc<dyn PeerConnectionFactory>,
            },
        );
        let views = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&views);
        coordinator.set_on_change(move |view| recorded.borrow_mut().push(view.clone()));
        Self {
            transport,
            devices,
            factory,
            coordinator,
            views,
        }
    }

    pub fn initiator() -> Self {
        Self::new(Role::Initiator)
    }

    pub fn responder() -> Self {
        Self::new(Role::Responder)
    }

    pub async fn open_channel(&self) {
        self.transport.open.set(true);
        self.coordinator.handle_channel_open().await;
    }

    pub async fn receive(&self, message: SignalMessage) {
        self.coordinator.handle_signal(message).await;
    }

    pub fn peer_count(&self) -> usize {
        self.factory.created.borrow().len()
    }

    pub fn peer(&self) -> Rc<FakePeer> {
        self.factory.created.borrow().first().cloned().unwrap()
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.transport.messages()
    }

    pub fn offers_sent(&self) -> usize {
        self.transport.count("OFFER")
    }
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 192.168.1.{n} 5000{n} typ host"),
        sdp_mid: Some("0".to_owned()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    }
}
