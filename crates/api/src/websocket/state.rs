//! Global WebSocket state management
//!
//! Ties together every live connection, the presence registry, the per-user
//! rooms, and the active-conversation tracker.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uchat_shared::UserId;

use super::connection::{Connection, SessionId};
use super::events::ServerEvent;
use super::presence::PresenceRegistry;
use super::room::RoomManager;
use super::tracker::ActiveConversationTracker;

/// Global WebSocket state shared across all connections
#[derive(Clone, Default)]
pub struct WebSocketState {
    /// All active connections indexed by session_id, superseded ones included
    pub connections: Arc<DashMap<SessionId, Arc<Connection>>>,

    /// Most recent connection per user
    pub presence: Arc<PresenceRegistry>,

    /// Per-user delivery rooms
    pub rooms: Arc<RoomManager>,

    /// Conversation each user has open
    pub tracker: Arc<ActiveConversationTracker>,

    /// Serializes online-user broadcasts so each receiver sees snapshots in order
    presence_broadcast: Arc<Mutex<()>>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authenticated connection: room, presence, broadcast
    pub fn register(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        self.connections.insert(conn.session_id, Arc::clone(&conn));
        self.rooms.join(Arc::clone(&conn));

        if let Some(previous) = self.presence.join(Arc::clone(&conn)) {
            tracing::info!(
                user_id = %conn.user_id,
                previous_session_id = %previous.session_id,
                session_id = %conn.session_id,
                "Presence superseded by newer connection"
            );
            let _ = previous.send(ServerEvent::SessionReplaced {
                session_id: conn.session_id,
            });
        }

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            total_connections = self.connections.len(),
            "WebSocket connection added"
        );

        self.broadcast_online_users();
        conn
    }

    /// Tear down a connection after the transport closed
    pub fn unregister(&self, conn: &Connection) {
        self.connections.remove(&conn.session_id);
        self.rooms.leave(&conn.user_id, &conn.session_id);

        if self.tracker.clear_for_session(&conn.user_id, &conn.session_id) {
            tracing::debug!(user_id = %conn.user_id, "Cleared active conversation on disconnect");
        }

        let went_offline = self.presence.leave(conn.user_id, conn.session_id);

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            went_offline,
            remaining_connections = self.connections.len(),
            "WebSocket connection removed"
        );

        if went_offline {
            self.broadcast_online_users();
        }
    }

    /// Send the current online set to every live connection
    pub fn broadcast_online_users(&self) {
        let _guard = self.presence_broadcast.lock();
        let online = self.presence.snapshot();

        let mut recipients = 0;
        for conn in self.connections.iter() {
            if conn.send(ServerEvent::OnlineUsers(online.clone())).is_ok() {
                recipients += 1;
            }
        }

        tracing::debug!(online = online.len(), recipients, "Broadcast online users");
    }

    /// Deliver an event to every connection of a user
    pub fn emit_to_user(&self, user_id: &UserId, event: ServerEvent) -> usize {
        self.rooms.emit(user_id, event)
    }

    /// Get total number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Get statistics about the WebSocket state
    pub fn get_stats(&self) -> WebSocketStats {
        WebSocketStats {
            active_connections: self.connection_count(),
            online_users: self.presence.len(),
            active_rooms: self.rooms.room_count(),
            active_conversations: self.tracker.len(),
        }
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct WebSocketStats {
    pub active_connections: usize,
    pub online_users: usize,
    pub active_rooms: usize,
    /// Users with an open conversation
    pub active_conversations: usize,
}
