use std::str::FromStr;

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use coach_call_protocol::{Role, SessionId};
use log::{info, warn};
use serde::Deserialize;

use crate::session::{self, Connections, Sessions};

#[derive(Default, Clone)]
pub struct ServerState {
    connections: Connections,
    sessions: Sessions,
}

/// Query string of a join request: `?token=..&role=..`.
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    token: Option<String>,
    role: Option<String>,
}

#[allow(clippy::unused_async)]
async fn health_handler() -> &'static str {
    "OK"
}

async fn session_handler(
    State(state): State<ServerState>,
    Path(session_id): Path<String>,
    Query(params): Query<JoinParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.token.as_deref().map_or(true, str::is_empty) {
        warn!("rejecting join of session {} without a token", session_id);
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    }
    let role = match params.role.as_deref().map(Role::from_str) {
        Some(Ok(role)) => role,
        Some(Err(err)) => return (StatusCode::BAD_REQUEST, err).into_response(),
        None => return (StatusCode::BAD_REQUEST, "missing role").into_response(),
    };
    let session_id = SessionId::new(session_id);

    let Some((participant, outbox)) =
        session::reserve(session_id.clone(), role, &state.connections, &state.sessions).await
    else {
        info!("{} seat of session {} is already taken", role, session_id);
        return (StatusCode::CONFLICT, "seat already taken").into_response();
    };

    let released = participant.clone();
    let failed_state = state.clone();
    ws.on_failed_upgrade(move |err| {
        warn!("websocket upgrade failed for {:?}: {}", released, err);
        tokio::spawn(async move {
            session::user_disconnected(&released, &failed_state.connections, &failed_state.sessions)
                .await;
        });
    })
    .on_upgrade(move |socket| {
        session::user_connected(
            socket,
            participant,
            outbox,
            state.connections,
            state.sessions,
        )
    })
}

pub fn create(server_state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/session/:session_id", get(session_handler))
        .with_state(server_state)
}
