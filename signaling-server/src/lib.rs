/*!
Relay pairing the two participants of a coach-call session.

Each participant opens a `WebSocket` on `/session/<session id>?token=..&role=..`.
A session has one seat per [`Role`](coach_call_protocol::Role); once both are taken the
relay forwards `READY`, `OFFER`, `ANSWER` and `ICE_CANDIDATE` messages from one participant
to the other untouched, and answers `JOIN_SESSION` with `USER_JOINED` notifications.
*/

pub mod config;
pub mod router;
pub mod session;
