/*!
Browser bindings: `WebSocket` signaling, `RTCPeerConnection` and `navigator.mediaDevices`.

# Example

```no_run
use coach_call::{CallConfig, Role, SessionId};

coach_call::web::init_logging(log::Level::Debug);

let config = CallConfig::new(
    "wss://relay.example.com/session",
    SessionId::new("booking-1234".to_owned()),
    "token",
    Role::Initiator,
);
let coordinator = coach_call::web::connect(&config).unwrap();
coordinator.set_on_change(|view| {
    log::info!("call is {:?}", view.state);
});
```
*/

use std::rc::Rc;

use log::{error, info};
use wasm_bindgen_futures::spawn_local;

use crate::coordinator::{NegotiationCoordinator, Platform};
use crate::CallConfig;

mod media;
mod peer_connection;
mod websocket;

pub use media::{WebMediaDevices, WebStream, WebTrack};
pub use peer_connection::{WebPeerConnection, WebPeerConnectionFactory};
pub use websocket::WebSocketTransport;

/// Route `log` records to the browser console and, with the `console_error_panic_hook`
/// feature, panics as well.
pub fn init_logging(level: log::Level) {
    set_panic_hook();
    wasm_logger::init(wasm_logger::Config::new(level));
}

pub fn set_panic_hook() {
    // When the `console_error_panic_hook` feature is enabled, we can call the
    // `set_panic_hook` function at least once during initialization, and then
    // we will get better error messages if our code ever panics.
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Open the signaling channel for `config` and start the session.
///
/// The initiator starts capturing camera and microphone right away; negotiation proceeds as
/// the relay delivers the other participant's signals.
///
/// # Errors
/// The signaling endpoint could not be built from the configuration.
pub fn connect(config: &CallConfig) -> crate::Result<NegotiationCoordinator> {
    let endpoint = config.signaling_endpoint()?;
    info!(
        "joining session {} as {}",
        config.session_id, config.role
    );
    let transport = Rc::new(WebSocketTransport::open(endpoint.as_str()));
    let coordinator = NegotiationCoordinator::new(
        config,
        Platform {
            transport: Rc::clone(&transport) as _,
            devices: Rc::new(WebMediaDevices),
            peers: Rc::new(WebPeerConnectionFactory),
        },
    );

    let weak = coordinator.downgrade();
    transport.on_open(move || {
        if let Some(coordinator) = weak.upgrade() {
            spawn_local(async move { coordinator.handle_channel_open().await });
        }
    });
    let weak = coordinator.downgrade();
    transport.on_message(move |text| {
        if let Some(coordinator) = weak.upgrade() {
            spawn_local(async move { coordinator.handle_text(&text).await });
        }
    });
    let weak = coordinator.downgrade();
    transport.on_close(move || {
        if let Some(coordinator) = weak.upgrade() {
            coordinator.handle_channel_closed();
        }
    });

    if !transport.is_connectable() {
        error!("signaling channel could not be created, leave and retry to reconnect");
        coordinator.handle_channel_closed();
    }

    let starting = coordinator.clone();
    spawn_local(async move { starting.start().await });
    Ok(coordinator)
}
