use std::cell::{Cell, RefCell};

use anyhow::anyhow;
use log::{debug, error, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use crate::signaling::SignalTransport;

/// Text `WebSocket` to the relay.
///
/// Each handler slot holds a single closure; registering again drops the previous one.
pub struct WebSocketTransport {
    websocket: Option<WebSocket>,
    closed: Cell<bool>,
    on_open: RefCell<Option<Closure<dyn FnMut(JsValue)>>>,
    on_message: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
    on_close: RefCell<Option<Closure<dyn FnMut(CloseEvent)>>>,
    on_error: RefCell<Option<Closure<dyn FnMut(JsValue)>>>,
}

impl WebSocketTransport {
    /// Start connecting to `endpoint`. If the browser refuses to even construct the socket
    /// the transport is returned anyway and never opens.
    #[must_use]
    pub fn open(endpoint: &str) -> Self {
        let websocket = match WebSocket::new(endpoint) {
            Ok(websocket) => Some(websocket),
            Err(err) => {
                error!(
                    "failed to create connection with signaling server on {}: {:?}",
                    endpoint, err
                );
                None
            }
        };
        Self {
            websocket,
            closed: Cell::new(false),
            on_open: RefCell::new(None),
            on_message: RefCell::new(None),
            on_close: RefCell::new(None),
            on_error: RefCell::new(None),
        }
    }

    /// `false` when the socket could not be constructed at all.
    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.websocket.is_some()
    }

    pub fn on_open(&self, mut callback: impl FnMut() + 'static) {
        let Some(websocket) = &self.websocket else {
            return;
        };
        let on_open: Box<dyn FnMut(JsValue)> = Box::new(move |_| {
            debug!("signaling websocket open");
            callback();
        });
        let on_open = Closure::wrap(on_open);
        websocket.set_onopen(Some(on_open.as_ref().unchecked_ref()));
        self.on_open.replace(Some(on_open));
    }

    /// Only text frames are delivered; binary frames are logged and dropped.
    pub fn on_message(&self, mut callback: impl FnMut(String) + 'static) {
        let Some(websocket) = &self.websocket else {
            return;
        };
        let on_message: Box<dyn FnMut(MessageEvent)> = Box::new(move |ev: MessageEvent| {
            match ev.data().as_string() {
                Some(text) => callback(text),
                None => warn!("dropping non-text frame from signaling server"),
            }
        });
        let on_message = Closure::wrap(on_message);
        websocket.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
        self.on_message.replace(Some(on_message));
    }

    /// Fires once the socket is closed, including when the handshake failed.
    pub fn on_close(&self, mut callback: impl FnMut() + 'static) {
        let Some(websocket) = &self.websocket else {
            return;
        };
        let on_close: Box<dyn FnMut(CloseEvent)> = Box::new(move |ev: CloseEvent| {
            debug!(
                "signaling websocket closed: code {}, reason {:?}",
                ev.code(),
                ev.reason()
            );
            callback();
        });
        let on_close = Closure::wrap(on_close);
        websocket.set_onclose(Some(on_close.as_ref().unchecked_ref()));
        self.on_close.replace(Some(on_close));

        let on_error: Box<dyn FnMut(JsValue)> = Box::new(move |err| {
            error!("signaling websocket error: {:?}", err);
        });
        let on_error = Closure::wrap(on_error);
        websocket.set_onerror(Some(on_error.as_ref().unchecked_ref()));
        self.on_error.replace(Some(on_error));
    }

    fn detach_handlers(&self) {
        if let Some(websocket) = &self.websocket {
            websocket.set_onopen(None);
            websocket.set_onmessage(None);
            websocket.set_onclose(None);
            websocket.set_onerror(None);
        }
    }
}

impl SignalTransport for WebSocketTransport {
    fn send_text(&self, text: &str) -> crate::Result<()> {
        let websocket = self
            .websocket
            .as_ref()
            .ok_or_else(|| anyhow!("signaling websocket was never created"))?;
        websocket
            .send_with_str(text)
            .map_err(|err| anyhow!("failed to send message across the websocket: {:?}", err))
    }

    fn is_open(&self) -> bool {
        !self.closed.get()
            && self
                .websocket
                .as_ref()
                .map_or(false, |websocket| websocket.ready_state() == WebSocket::OPEN)
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(websocket) = &self.websocket {
            if let Err(err) = websocket.close() {
                warn!("failed to close signaling websocket: {:?}", err);
            }
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
        self.detach_handlers();
    }
}
