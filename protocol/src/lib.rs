/*!
Helper crate that declares the types shared between the [coach-call](../coach_call/index.html)
client library and the [coach-call-relay](../coach_call_relay/index.html) signaling server.

Every message is a single JSON object discriminated by its `type` field,
see [`SignalMessage`].
*/

#![warn(missing_docs)]

mod common;
mod signal;

pub use common::{IceCandidate, Role, SessionId};
pub use signal::SignalMessage;
