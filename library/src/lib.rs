/*!
This crate negotiates a one-to-one `WebRTC` video session between a trainer and a trainee,
coordinated through a `WebSocket` relay from the accompanying `coach-call-relay` crate.

# Overview

Two browser peers share a [`SessionId`]. The [initiator](Role::Initiator) captures camera and
microphone and creates the `SDP` offer, the [responder](Role::Responder) answers it.
The [`NegotiationCoordinator`] makes sure the offer is created exactly once, only after the
signaling channel is open, local media is ready and the other participant is present,
no matter in which order those happen.

The UI only consumes a [`CallView`]: connection state, local and remote streams and the
mute / video / screen-share toggles.

On `wasm32` the [`web`] module binds the coordinator to `RtcPeerConnection`, `WebSocket` and
`navigator.mediaDevices`; everywhere else the platform traits can be implemented directly.
*/

#![allow(
    clippy::module_name_repetitions,
    clippy::future_not_send, // single threaded (WASM) context
)]
// clippy WARN level lints
#![warn(
    clippy::pedantic,
    clippy::dbg_macro,
    clippy::unwrap_used,
    clippy::map_err_ignore,
    clippy::panic,
    clippy::todo,
    clippy::undocumented_unsafe_blocks,
    clippy::unimplemented,
    clippy::unreachable
)]
// clippy WARN level lints, that can be upgraded to DENY if preferred
#![warn(
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::empty_structs_with_brackets,
    clippy::if_then_some_else_none,
    clippy::indexing_slicing,
    clippy::let_underscore_must_use,
    clippy::string_slice,
    clippy::try_err
)]
// clippy DENY level lints, they always have a quick fix that should be preferred
#![deny(
    clippy::wildcard_imports,
    clippy::multiple_inherent_impl,
    clippy::rc_buffer,
    clippy::rc_mutex,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_name_method,
    clippy::self_named_module_files,
    clippy::str_to_string,
    clippy::string_add,
    clippy::string_to_string,
    clippy::unnecessary_self_imports,
    clippy::verbose_file_reads
)]

mod config;
mod coordinator;
mod error;
pub mod gatekeeper;
pub mod media;
pub mod peer;
pub mod signaling;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use coach_call_protocol::{IceCandidate, Role, SessionId, SignalMessage};
pub use config::{CallConfig, ConnectionType, IceServer, DEFAULT_STUN_SERVER};
pub use coordinator::{
    CallView, MediaToggleState, NegotiationCoordinator, Platform,
    WeakCoordinator,
};
pub use error::{MediaError, Result};
pub use peer::NegotiationState;
pub use signaling::ChannelStatus;
