use std::cell::Cell;
use std::rc::Rc;

use coach_call_protocol::{SessionId, SignalMessage};
use log::{debug, error, warn};

/// Message oriented duplex transport to the relay (a `WebSocket` in the browser).
pub trait SignalTransport {
    /// # Errors
    /// The underlying transport refused the message.
    fn send_text(&self, text: &str) -> crate::Result<()>;
    fn is_open(&self) -> bool;
    /// Closing an already closed transport does nothing.
    fn close(&self);
}

/// Lifecycle of the signaling transport as shown to the UI.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelStatus {
    Connecting,
    Open,
    Closed,
}

/// Typed view over a [`SignalTransport`] scoped to one session.
#[derive(Clone)]
pub struct SignalingChannel {
    session_id: SessionId,
    transport: Rc<dyn SignalTransport>,
    closed: Rc<Cell<bool>>,
}

impl SignalingChannel {
    #[must_use]
    pub fn new(session_id: SessionId, transport: Rc<dyn SignalTransport>) -> Self {
        Self {
            session_id,
            transport,
            closed: Rc::new(Cell::new(false)),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.get() && self.transport.is_open()
    }

    /// Serialize and send a message. Returns whether it was handed to the transport;
    /// messages sent while the channel is not open are dropped.
    pub fn send(&self, message: &SignalMessage) -> bool {
        if !self.is_open() {
            warn!(
                "session {}: channel not open, dropping {}",
                self.session_id,
                message.kind()
            );
            return false;
        }
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(err) => {
                error!("failed to serialize {}: {}", message.kind(), err);
                return false;
            }
        };
        match self.transport.send_text(&text) {
            Ok(()) => {
                debug!("session {}: sent {}", self.session_id, message.kind());
                true
            }
            Err(err) => {
                error!(
                    "session {}: failed to send {}: {:?}",
                    self.session_id,
                    message.kind(),
                    err
                );
                false
            }
        }
    }

    /// Idempotent.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        debug!("session {}: closing signaling channel", self.session_id);
        self.transport.close();
    }

    /// Parse an incoming frame; malformed frames are logged and skipped.
    #[must_use]
    pub fn decode(text: &str) -> Option<SignalMessage> {
        match serde_json::from_str(text) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!("ignoring malformed signal message: {}", err);
                None
            }
        }
    }
}
