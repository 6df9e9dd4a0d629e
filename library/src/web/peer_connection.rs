use std::rc::Rc;

use anyhow::anyhow;
use async_trait::async_trait;
use coach_call_protocol::IceCandidate;
use js_sys::{Array, Object, Reflect};
use log::{debug, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    RtcConfiguration, RtcIceCandidate, RtcIceCandidateInit, RtcPeerConnection,
    RtcPeerConnectionIceEvent, RtcPeerConnectionState, RtcRtpSender, RtcSdpType,
    RtcSessionDescriptionInit, RtcSignalingState, RtcTrackEvent,
};

use crate::config::IceServer;
use crate::media::{MediaStream, MediaTrack};
use crate::peer::{
    PeerConnection, PeerConnectionFactory, PeerConnectionState, PeerEventSink, SdpType,
    SignalingState,
};
use crate::web::media::{native_stream, native_track, WebStream};

fn js_error(context: &str, err: &JsValue) -> anyhow::Error {
    anyhow!("{}: {:?}", context, err)
}

fn ice_servers_to_js(ice_servers: &[IceServer]) -> Result<Array, JsValue> {
    let servers = Array::new();
    for server in ice_servers {
        let entry = Object::new();
        let urls = Array::new();
        for url in &server.urls {
            urls.push(&JsValue::from_str(url));
        }
        Reflect::set(&entry, &"urls".into(), &urls)?;
        if let Some(username) = &server.username {
            Reflect::set(&entry, &"username".into(), &username.into())?;
        }
        if let Some(credential) = &server.credential {
            Reflect::set(&entry, &"credential".into(), &credential.into())?;
        }
        servers.push(&entry);
    }
    Ok(servers)
}

pub(crate) fn create_peer_connection(
    ice_servers: &[IceServer],
) -> crate::Result<RtcPeerConnection> {
    if ice_servers.is_empty() {
        return RtcPeerConnection::new()
            .map_err(|err| js_error("failed to create local peer connection", &err));
    }
    let servers = ice_servers_to_js(ice_servers)
        .map_err(|err| js_error("failed to build ICE server list", &err))?;
    let rtc_configuration = RtcConfiguration::new();
    rtc_configuration.set_ice_servers(&servers);
    RtcPeerConnection::new_with_configuration(&rtc_configuration)
        .map_err(|err| js_error("failed to create peer connection", &err))
}

const fn sdp_type(kind: SdpType) -> RtcSdpType {
    match kind {
        SdpType::Offer => RtcSdpType::Offer,
        SdpType::Answer => RtcSdpType::Answer,
    }
}

/// `RTCPeerConnectionState` as seen by the negotiation core; unknown values read as `new`.
fn connection_state(state: RtcPeerConnectionState) -> PeerConnectionState {
    match state {
        RtcPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RtcPeerConnectionState::Connected => PeerConnectionState::Connected,
        RtcPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RtcPeerConnectionState::Failed => PeerConnectionState::Failed,
        RtcPeerConnectionState::Closed => PeerConnectionState::Closed,
        _ => PeerConnectionState::New,
    }
}

async fn sdp_of(promise: js_sys::Promise, what: &str) -> crate::Result<String> {
    let description = JsFuture::from(promise)
        .await
        .map_err(|err| js_error(&format!("failed to create an SDP {what}"), &err))?;
    Reflect::get(&description, &JsValue::from_str("sdp"))
        .map_err(|err| js_error("SDP description has no sdp field", &err))?
        .as_string()
        .ok_or_else(|| anyhow!("SDP {} is not a string", what))
}

/// Browser `RTCPeerConnection`.
pub struct WebPeerConnection {
    peer_connection: RtcPeerConnection,
}

impl WebPeerConnection {
    fn video_sender(&self) -> Option<RtcRtpSender> {
        self.peer_connection
            .get_senders()
            .iter()
            .filter_map(|sender| sender.dyn_into::<RtcRtpSender>().ok())
            .find(|sender| {
                sender
                    .track()
                    .map_or(false, |track| track.kind() == "video")
            })
    }
}

#[async_trait(?Send)]
impl PeerConnection for WebPeerConnection {
    async fn create_offer(&self) -> crate::Result<String> {
        sdp_of(self.peer_connection.create_offer(), "offer").await
    }

    async fn create_answer(&self) -> crate::Result<String> {
        sdp_of(self.peer_connection.create_answer(), "answer").await
    }

    async fn set_local_description(&self, kind: SdpType, sdp: &str) -> crate::Result<()> {
        let description = RtcSessionDescriptionInit::new(sdp_type(kind));
        description.set_sdp(sdp);
        JsFuture::from(self.peer_connection.set_local_description(&description))
            .await
            .map_err(|err| js_error("failed to set local description", &err))?;
        Ok(())
    }

    async fn set_remote_description(&self, kind: SdpType, sdp: &str) -> crate::Result<()> {
        let description = RtcSessionDescriptionInit::new(sdp_type(kind));
        description.set_sdp(sdp);
        JsFuture::from(self.peer_connection.set_remote_description(&description))
            .await
            .map_err(|err| js_error("failed to set remote description", &err))?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> crate::Result<()> {
        let init = RtcIceCandidateInit::new(&candidate.candidate);
        init.set_sdp_mid(candidate.sdp_mid.as_deref());
        init.set_sdp_m_line_index(candidate.sdp_m_line_index);
        if let Some(username_fragment) = &candidate.username_fragment {
            Reflect::set(&init, &"usernameFragment".into(), &username_fragment.into())
                .map_err(|err| js_error("failed to set usernameFragment", &err))?;
        }
        let rtc_candidate = RtcIceCandidate::new(&init)
            .map_err(|err| js_error("failed to create new RtcIceCandidate", &err))?;
        JsFuture::from(
            self.peer_connection
                .add_ice_candidate_with_opt_rtc_ice_candidate(Some(&rtc_candidate)),
        )
        .await
        .map_err(|err| js_error("failed to add ICE candidate", &err))?;
        Ok(())
    }

    async fn replace_video_track(&self, track: Rc<dyn MediaTrack>) -> crate::Result<()> {
        let native = native_track(track.as_ref())?;
        let sender = self
            .video_sender()
            .ok_or_else(|| anyhow!("no sender is carrying video"))?;
        JsFuture::from(sender.replace_track(Some(native)))
            .await
            .map_err(|err| js_error("failed to replace video track", &err))?;
        Ok(())
    }

    fn add_track(
        &self,
        track: Rc<dyn MediaTrack>,
        stream: &Rc<dyn MediaStream>,
    ) -> crate::Result<()> {
        let native = native_track(track.as_ref())?;
        let native_stream = native_stream(stream.as_ref())?;
        self.peer_connection.add_track_0(native, native_stream);
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        match self.peer_connection.signaling_state() {
            RtcSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RtcSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RtcSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RtcSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RtcSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    fn has_remote_description(&self) -> bool {
        self.peer_connection.remote_description().is_some()
    }

    fn close(&self) {
        self.peer_connection.set_onicecandidate(None);
        self.peer_connection.set_ontrack(None);
        self.peer_connection.set_onconnectionstatechange(None);
        self.peer_connection.close();
    }
}

/// Creates browser peer connections wired to a [`PeerEventSink`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WebPeerConnectionFactory;

impl PeerConnectionFactory for WebPeerConnectionFactory {
    fn create(
        &self,
        ice_servers: &[IceServer],
        events: Rc<dyn PeerEventSink>,
    ) -> crate::Result<Rc<dyn PeerConnection>> {
        let peer_connection = create_peer_connection(ice_servers)?;
        set_peer_connection_on_ice_candidate(&peer_connection, Rc::clone(&events));
        set_peer_connection_on_track(&peer_connection, Rc::clone(&events));
        set_peer_connection_on_connection_state_change(&peer_connection, events);
        Ok(Rc::new(WebPeerConnection { peer_connection }))
    }
}

fn set_peer_connection_on_ice_candidate(
    peer_connection: &RtcPeerConnection,
    events: Rc<dyn PeerEventSink>,
) {
    let on_ice_candidate: Box<dyn FnMut(RtcPeerConnectionIceEvent)> =
        Box::new(move |ev: RtcPeerConnectionIceEvent| {
            let Some(candidate) = ev.candidate() else {
                debug!("ICE gathering complete");
                return;
            };
            events.ice_candidate(IceCandidate {
                candidate: candidate.candidate(),
                sdp_mid: candidate.sdp_mid(),
                sdp_m_line_index: candidate.sdp_m_line_index(),
                username_fragment: Reflect::get(&candidate, &"usernameFragment".into())
                    .ok()
                    .and_then(|value| value.as_string()),
            });
        });
    let on_ice_candidate = Closure::wrap(on_ice_candidate);
    peer_connection.set_onicecandidate(Some(on_ice_candidate.as_ref().unchecked_ref()));
    on_ice_candidate.forget();
}

fn set_peer_connection_on_track(peer_connection: &RtcPeerConnection, events: Rc<dyn PeerEventSink>) {
    let on_track: Box<dyn FnMut(RtcTrackEvent)> = Box::new(move |ev: RtcTrackEvent| {
        match ev.streams().get(0).dyn_into::<web_sys::MediaStream>() {
            Ok(stream) => events.remote_stream(Rc::new(WebStream::new(stream))),
            Err(_) => warn!("remote track {} arrived without a stream", ev.track().id()),
        }
    });
    let on_track = Closure::wrap(on_track);
    peer_connection.set_ontrack(Some(on_track.as_ref().unchecked_ref()));
    on_track.forget();
}

fn set_peer_connection_on_connection_state_change(
    peer_connection: &RtcPeerConnection,
    events: Rc<dyn PeerEventSink>,
) {
    let peer_connection_clone = peer_connection.clone();
    let on_connection_state_change: Box<dyn FnMut()> = Box::new(move || {
        let state = peer_connection_clone.connection_state();
        debug!("connection state change: {:?}", state);
        events.connection_state(connection_state(state));
    });
    let on_connection_state_change = Closure::wrap(on_connection_state_change);
    peer_connection.set_onconnectionstatechange(Some(
        on_connection_state_change.as_ref().unchecked_ref(),
    ));
    on_connection_state_change.forget();
}
