use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::error::MediaError;

/// Runs once when a track is ended by the user agent, e.g. the browser's "Stop sharing" button.
/// The returned future is driven by the platform's executor.
pub type EndedHandler = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()>>>>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A single local or remote media track (`MediaStreamTrack` in the browser).
pub trait MediaTrack: Debug {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
    fn enabled(&self) -> bool;
    fn set_enabled(&self, enabled: bool);
    /// Stopping an already ended track does nothing.
    fn stop(&self);
    fn is_ended(&self) -> bool;
    /// Not called for [`MediaTrack::stop`]. Platforms without an ended event drop the handler.
    fn on_ended(&self, handler: EndedHandler) {
        drop(handler);
    }
    /// Access to the platform object behind the trait.
    fn as_any(&self) -> &dyn Any;
}

/// A group of tracks captured or received together (`MediaStream` in the browser).
pub trait MediaStream: Debug {
    fn id(&self) -> String;
    fn tracks(&self) -> Vec<Rc<dyn MediaTrack>>;
    /// Access to the platform object behind the trait.
    fn as_any(&self) -> &dyn Any;

    fn tracks_of(&self, kind: TrackKind) -> Vec<Rc<dyn MediaTrack>> {
        self.tracks()
            .into_iter()
            .filter(|track| track.kind() == kind)
            .collect()
    }

    fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

/// Capture devices available to the page.
#[async_trait(?Send)]
pub trait MediaDevices {
    /// Combined camera and microphone capture.
    async fn get_user_media(&self) -> Result<Rc<dyn MediaStream>, MediaError>;
    /// Screen, window or tab capture.
    async fn get_display_media(&self) -> Result<Rc<dyn MediaStream>, MediaError>;
}

/// Obtains the initiator's local audio and video.
#[derive(Clone)]
pub struct MediaAcquirer {
    devices: Rc<dyn MediaDevices>,
}

impl MediaAcquirer {
    #[must_use]
    pub fn new(devices: Rc<dyn MediaDevices>) -> Self {
        Self { devices }
    }

    /// Request camera and microphone together. Never retries, partially or otherwise.
    ///
    /// # Errors
    /// Permission was refused, no device is available or capture is unsupported.
    pub async fn acquire(&self) -> Result<Rc<dyn MediaStream>, MediaError> {
        debug!("requesting camera and microphone");
        match self.devices.get_user_media().await {
            Ok(stream) => {
                info!(
                    "local media acquired: stream {} with {} tracks",
                    stream.id(),
                    stream.tracks().len()
                );
                Ok(stream)
            }
            Err(err) => {
                warn!("local media unavailable: {}", err);
                Err(err)
            }
        }
    }

    /// Request a display capture for screen sharing.
    ///
    /// # Errors
    /// The user cancelled the picker or display capture is unsupported.
    pub async fn acquire_display(&self) -> Result<Rc<dyn MediaStream>, MediaError> {
        debug!("requesting display capture");
        self.devices.get_display_media().await
    }
}

/// Toggle the `enabled` flag of every track of given kind, returns how many were touched.
pub(crate) fn set_tracks_enabled(
    stream: Option<&Rc<dyn MediaStream>>,
    kind: TrackKind,
    enabled: bool,
) -> usize {
    let Some(stream) = stream else {
        return 0;
    };
    let tracks = stream.tracks_of(kind);
    for track in &tracks {
        track.set_enabled(enabled);
    }
    tracks.len()
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;

    #[derive(Debug)]
    struct Track {
        kind: TrackKind,
        enabled: Cell<bool>,
    }

    impl MediaTrack for Track {
        fn id(&self) -> String {
            format!("{:?}", self.kind)
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

        fn stop(&self) {}

        fn is_ended(&self) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Stream(Vec<Rc<dyn MediaTrack>>);

    impl MediaStream for Stream {
        fn id(&self) -> String {
            "stream".to_owned()
        }

        fn tracks(&self) -> Vec<Rc<dyn MediaTrack>> {
            self.0.clone()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn track(kind: TrackKind) -> Rc<dyn MediaTrack> {
        Rc::new(Track {
            kind,
            enabled: Cell::new(true),
        })
    }

    #[test]
    fn only_tracks_of_given_kind_are_toggled() {
        let stream: Rc<dyn MediaStream> = Rc::new(Stream(vec![
            track(TrackKind::Audio),
            track(TrackKind::Video),
            track(TrackKind::Video),
        ]));

        assert_eq!(set_tracks_enabled(Some(&stream), TrackKind::Video, false), 2);
        let enabled: Vec<_> = stream.tracks().iter().map(|track| track.enabled()).collect();
        assert_eq!(enabled, [true, false, false]);
    }

    #[test]
    fn toggling_without_stream_touches_nothing() {
        assert_eq!(set_tracks_enabled(None, TrackKind::Audio, false), 0);
    }
}
