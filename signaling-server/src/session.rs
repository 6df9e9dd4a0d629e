use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use coach_call_protocol::{Role, SessionId, SignalMessage};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub type UserId = usize;

/// The two seats of a session; each is held by at most one connection.
#[derive(Debug, Default)]
pub struct Session {
    initiator: Option<UserId>,
    responder: Option<UserId>,
}

impl Session {
    #[must_use]
    pub const fn holder(&self, role: Role) -> Option<UserId> {
        match role {
            Role::Initiator => self.initiator,
            Role::Responder => self.responder,
        }
    }

    #[must_use]
    pub const fn is_taken(&self, role: Role) -> bool {
        self.holder(role).is_some()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.initiator.is_none() && self.responder.is_none()
    }

    fn seat_mut(&mut self, role: Role) -> &mut Option<UserId> {
        match role {
            Role::Initiator => &mut self.initiator,
            Role::Responder => &mut self.responder,
        }
    }
}

pub type Connections = Arc<RwLock<HashMap<UserId, mpsc::UnboundedSender<Message>>>>;
pub type Sessions = Arc<RwLock<HashMap<SessionId, Session>>>;

/// A connection holding a seat.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: UserId,
    pub session_id: SessionId,
    pub role: Role,
}

static NEXT_USER_ID: AtomicUsize = AtomicUsize::new(1);

/// Claim the seat for `role` and open an outbox for it, before the `WebSocket` handshake
/// completes. Returns `None` if the seat is taken.
pub async fn reserve(
    session_id: SessionId,
    role: Role,
    connections: &Connections,
    sessions: &Sessions,
) -> Option<(Participant, mpsc::UnboundedReceiver<Message>)> {
    let mut sessions = sessions.write().await;
    let session = sessions.entry(session_id.clone()).or_default();
    if session.is_taken(role) {
        return None;
    }
    let id = NEXT_USER_ID.fetch_add(1, Ordering::Relaxed);
    *session.seat_mut(role) = Some(id);

    let (tx, rx) = mpsc::unbounded_channel();
    connections.write().await.insert(id, tx);
    info!("user {} took the {} seat of session {}", id, role, session_id);
    Some((
        Participant {
            id,
            session_id,
            role,
        },
        rx,
    ))
}

pub async fn user_connected(
    ws: WebSocket,
    participant: Participant,
    outbox: mpsc::UnboundedReceiver<Message>,
    connections: Connections,
    sessions: Sessions,
) {
    info!("new user connected: {:?}", participant);

    let (mut user_ws_tx, mut user_ws_rx) = ws.split();
    let mut outbox = UnboundedReceiverStream::new(outbox);

    let id = participant.id;
    tokio::task::spawn(async move {
        while let Some(message) = outbox.next().await {
            if let Err(err) = user_ws_tx.send(message).await {
                warn!("websocket send error (id={}): {}", id, err);
                break;
            }
        }
    });

    while let Some(result) = user_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(err) => {
                warn!("websocket error (id={}): {}", participant.id, err);
                break;
            }
        };
        match msg {
            Message::Text(text) => user_message(&participant, text, &connections, &sessions).await,
            Message::Close(_) => break,
            _ => debug!("ignoring non-text frame from user {}", participant.id),
        }
    }

    info!("user disconnected: {:?}", participant);
    user_disconnected(&participant, &connections, &sessions).await;
}

async fn user_message(
    participant: &Participant,
    text: String,
    connections: &Connections,
    sessions: &Sessions,
) {
    let request = match serde_json::from_str::<SignalMessage>(&text) {
        Ok(request) => request,
        Err(err) => {
            warn!(
                "malformed message from user {}: {}",
                participant.id, err
            );
            return;
        }
    };
    debug!(
        "message received from user {}: {}",
        participant.id,
        request.kind()
    );

    let other_role = participant.role.other();
    let other = sessions
        .read()
        .await
        .get(&participant.session_id)
        .and_then(|session| session.holder(other_role));

    match request {
        SignalMessage::JoinSession => {
            let Some(other) = other else {
                debug!(
                    "{} of session {} is waiting for the {}",
                    participant.role, participant.session_id, other_role
                );
                return;
            };
            let connections = connections.read().await;
            send(
                &connections,
                other,
                &SignalMessage::UserJoined {
                    role: participant.role,
                },
            );
            send(
                &connections,
                participant.id,
                &SignalMessage::UserJoined { role: other_role },
            );
        }
        // pass negotiation messages to the other participant without changing anything
        SignalMessage::Ready
        | SignalMessage::Offer { .. }
        | SignalMessage::Answer { .. }
        | SignalMessage::IceCandidate { .. } => match other {
            Some(other) => {
                if let Some(tx) = connections.read().await.get(&other) {
                    if tx.send(Message::Text(text)).is_err() {
                        error!("outbox of user {} is closed", other);
                    }
                }
            }
            None => warn!(
                "no {} in session {}, dropping {}",
                other_role,
                participant.session_id,
                request.kind()
            ),
        },
        SignalMessage::UserJoined { .. } | SignalMessage::Unknown => {
            warn!(
                "ignoring {} sent by user {}",
                request.kind(),
                participant.id
            );
        }
    }
}

fn send(
    connections: &HashMap<UserId, mpsc::UnboundedSender<Message>>,
    recipient: UserId,
    message: &SignalMessage,
) {
    let Some(tx) = connections.get(&recipient) else {
        error!("no connection for user {}", recipient);
        return;
    };
    match serde_json::to_string(message) {
        Ok(text) => {
            if tx.send(Message::Text(text)).is_err() {
                error!("outbox of user {} is closed", recipient);
            }
        }
        Err(err) => error!("failed to serialize {}: {}", message.kind(), err),
    }
}

/// Free the participant's seat and outbox; the session goes away with its last participant.
pub async fn user_disconnected(
    participant: &Participant,
    connections: &Connections,
    sessions: &Sessions,
) {
    let mut sessions = sessions.write().await;
    if let Entry::Occupied(mut entry) = sessions.entry(participant.session_id.clone()) {
        let seat = entry.get_mut().seat_mut(participant.role);
        if *seat == Some(participant.id) {
            *seat = None;
        }
        if entry.get().is_empty() {
            entry.remove();
            debug!("session {} closed", participant.session_id);
        }
    }
    connections.write().await.remove(&participant.id);
}

#[cfg(test)]
mod test {
    use super::*;

    fn session_id() -> SessionId {
        SessionId::new("booking-42".to_owned())
    }

    #[tokio::test]
    async fn seats_are_exclusive_per_role() {
        let connections = Connections::default();
        let sessions = Sessions::default();

        let (initiator, _rx) = reserve(session_id(), Role::Initiator, &connections, &sessions)
            .await
            .unwrap();
        assert!(
            reserve(session_id(), Role::Initiator, &connections, &sessions)
                .await
                .is_none()
        );
        let (responder, _rx2) = reserve(session_id(), Role::Responder, &connections, &sessions)
            .await
            .unwrap();
        assert_ne!(initiator.id, responder.id);
        assert_eq!(connections.read().await.len(), 2);
    }

    #[tokio::test]
    async fn last_participant_leaving_removes_session() {
        let connections = Connections::default();
        let sessions = Sessions::default();

        let (initiator, _rx) = reserve(session_id(), Role::Initiator, &connections, &sessions)
            .await
            .unwrap();
        let (responder, _rx2) = reserve(session_id(), Role::Responder, &connections, &sessions)
            .await
            .unwrap();

        user_disconnected(&initiator, &connections, &sessions).await;
        {
            let sessions = sessions.read().await;
            let session = sessions.get(&session_id()).unwrap();
            assert!(!session.is_taken(Role::Initiator));
            assert!(session.is_taken(Role::Responder));
        }

        user_disconnected(&responder, &connections, &sessions).await;
        assert!(sessions.read().await.is_empty());
        assert!(connections.read().await.is_empty());
    }
}
