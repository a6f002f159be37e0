//! WebSocket handler for Axum
//!
//! Authenticates the upgrade request, then pumps events between the socket
//! and the chat service.

use axum::{
    async_trait,
    extract::{
        ws::{Message, WebSocket},
        FromRequestParts, Query, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uchat_shared::UserId;

use crate::chat::ChatService;
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    /// `Bearer <jwt>`, for clients that cannot set headers on the upgrade
    token: Option<String>,
}

/// Identity proven by the upgrade request
///
/// The credential comes from the `Authorization` header or the `token` query
/// parameter. Extracted ahead of [`WebSocketUpgrade`], so a bad credential
/// ends the request with 401 before anything is registered.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeIdentity(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for UpgradeIdentity {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query_token = Query::<WebSocketQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(query)| query.token);
        let credential = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .or(query_token);

        match state.authenticator.authenticate(credential.as_deref()) {
            Ok(user_id) => Ok(Self(user_id)),
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket auth failed");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
pub async fn ws_handler(
    UpgradeIdentity(user_id): UpgradeIdentity,
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
) -> Response {
    tracing::info!(user_id = %user_id, "WebSocket connection upgrade requested");

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, app_state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: UserId, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn = Connection::new(user_id, tx);
    let session_id = conn.session_id;
    let _ = conn.send(ServerEvent::Connected { session_id });

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.register(conn);

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Events from one connection are handled in arrival order
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &app_state.chat).await,
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        session_id = %session_id,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::Error {
                        message: "Invalid event format".to_string(),
                    });
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            // Axum answers pings itself; binary frames are not part of the protocol
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    error = ?e,
                    session_id = %session_id,
                    "WebSocket receive error"
                );
                break;
            }
        }
    }

    tracing::info!(
        session_id = %session_id,
        user_id = %user_id,
        "WebSocket connection closing"
    );
    ws_state.unregister(&conn);
    send_task.abort();
}

/// Route one inbound event to the chat service
pub async fn handle_client_event(event: ClientEvent, conn: &Connection, chat: &ChatService) {
    match event {
        ClientEvent::SendMessage(payload) => chat.handle_send(conn, payload).await,
        ClientEvent::ActiveChat(payload) => chat.handle_active_chat(conn, payload).await,
        ClientEvent::InactiveChat => {
            if chat.clear_active(conn) {
                tracing::debug!(user_id = %conn.user_id, "Active conversation cleared");
            }
        }
        ClientEvent::MarkSeen(payload) => chat.handle_mark_seen(conn, payload).await,
        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}
