use std::any::Any;
use std::rc::Rc;

use anyhow::anyhow;
use async_trait::async_trait;
use js_sys::Reflect;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{DisplayMediaStreamConstraints, MediaStreamConstraints, MediaStreamTrackState};

use crate::error::MediaError;
use crate::media::{EndedHandler, MediaDevices, MediaStream, MediaTrack, TrackKind};

/// Browser `MediaStreamTrack`.
#[derive(Debug, Clone)]
pub struct WebTrack {
    track: web_sys::MediaStreamTrack,
}

impl WebTrack {
    #[must_use]
    pub const fn new(track: web_sys::MediaStreamTrack) -> Self {
        Self { track }
    }

    #[must_use]
    pub const fn native(&self) -> &web_sys::MediaStreamTrack {
        &self.track
    }
}

impl MediaTrack for WebTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> TrackKind {
        if self.track.kind() == "audio" {
            TrackKind::Audio
        } else {
            TrackKind::Video
        }
    }

    fn enabled(&self) -> bool {
        self.track.enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.track.set_enabled(enabled);
    }

    fn stop(&self) {
        self.track.stop();
    }

    fn is_ended(&self) -> bool {
        self.track.ready_state() == MediaStreamTrackState::Ended
    }

    fn on_ended(&self, handler: EndedHandler) {
        let mut handler = Some(handler);
        let onended_callback = Closure::wrap(Box::new(move || {
            if let Some(handler) = handler.take() {
                spawn_local(handler());
            }
        }) as Box<dyn FnMut()>);
        self.track
            .set_onended(Some(onended_callback.as_ref().unchecked_ref()));
        onended_callback.forget();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Browser `MediaStream`; this is what the UI attaches to a `<video>` element's `srcObject`.
#[derive(Debug, Clone)]
pub struct WebStream {
    stream: web_sys::MediaStream,
}

impl WebStream {
    #[must_use]
    pub const fn new(stream: web_sys::MediaStream) -> Self {
        Self { stream }
    }

    #[must_use]
    pub const fn native(&self) -> &web_sys::MediaStream {
        &self.stream
    }
}

impl MediaStream for WebStream {
    fn id(&self) -> String {
        self.stream.id()
    }

    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
        self.stream
            .get_tracks()
            .iter()
            .filter_map(|track| track.dyn_into::<web_sys::MediaStreamTrack>().ok())
            .map(|track| Rc::new(WebTrack::new(track)) as Rc<dyn MediaTrack>)
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The browser object behind a track created by this module.
pub(crate) fn native_track(track: &dyn MediaTrack) -> crate::Result<&web_sys::MediaStreamTrack> {
    track
        .as_any()
        .downcast_ref::<WebTrack>()
        .map(WebTrack::native)
        .ok_or_else(|| anyhow!("track {} is not a browser track", track.id()))
}

pub(crate) fn native_stream(stream: &dyn MediaStream) -> crate::Result<&web_sys::MediaStream> {
    stream
        .as_any()
        .downcast_ref::<WebStream>()
        .map(WebStream::native)
        .ok_or_else(|| anyhow!("stream {} is not a browser stream", stream.id()))
}

fn media_error(err: &JsValue) -> MediaError {
    let field = |name: &str| {
        Reflect::get(err, &JsValue::from_str(name))
            .ok()
            .and_then(|value| value.as_string())
            .unwrap_or_default()
    };
    MediaError::from_dom_exception(&field("name"), &field("message"))
}

async fn stream_of(promise: js_sys::Promise) -> Result<Rc<dyn MediaStream>, MediaError> {
    let stream = JsFuture::from(promise)
        .await
        .map_err(|err| media_error(&err))?
        .dyn_into::<web_sys::MediaStream>()
        .map_err(|_| MediaError::Unsupported)?;
    Ok(Rc::new(WebStream::new(stream)))
}

/// `navigator.mediaDevices`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebMediaDevices;

impl WebMediaDevices {
    fn devices() -> Result<web_sys::MediaDevices, MediaError> {
        web_sys::window()
            .ok_or(MediaError::Unsupported)?
            .navigator()
            .media_devices()
            .map_err(|_| MediaError::Unsupported)
    }
}

#[async_trait(?Send)]
impl MediaDevices for WebMediaDevices {
    async fn get_user_media(&self) -> Result<Rc<dyn MediaStream>, MediaError> {
        let constraints = MediaStreamConstraints::new();
        constraints.set_audio(&JsValue::TRUE);
        constraints.set_video(&JsValue::TRUE);
        let promise = Self::devices()?
            .get_user_media_with_constraints(&constraints)
            .map_err(|err| media_error(&err))?;
        stream_of(promise).await
    }

    async fn get_display_media(&self) -> Result<Rc<dyn MediaStream>, MediaError> {
        let constraints = DisplayMediaStreamConstraints::new();
        constraints.set_video(&JsValue::TRUE);
        let promise = Self::devices()?
            .get_display_media_with_constraints(&constraints)
            .map_err(|err| media_error(&err))?;
        stream_of(promise).await
    }
}
