//! Per-user room management for targeted delivery
//!
//! Every connection joins exactly one room, keyed by its own user ID.
//! Delivery code addresses users, never connections, so a reconnect only
//! changes room membership and never the routing decision.

use std::sync::Arc;

use dashmap::DashMap;
use uchat_shared::UserId;

use super::connection::{Connection, SessionId};
use super::events::ServerEvent;

/// Manages per-user "rooms" for delivering events
#[derive(Debug, Default)]
pub struct RoomManager {
    /// Map of user_id -> that user's live connections
    rooms: DashMap<UserId, Vec<Arc<Connection>>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to its user's room
    pub fn join(&self, conn: Arc<Connection>) {
        let mut room = self.rooms.entry(conn.user_id).or_default();
        if !room.iter().any(|c| c.session_id == conn.session_id) {
            room.push(Arc::clone(&conn));
        }

        tracing::debug!(
            user_id = %conn.user_id,
            session_id = %conn.session_id,
            room_size = room.len(),
            "Connection joined user room"
        );
    }

    /// Remove a connection from a user's room
    pub fn leave(&self, user_id: &UserId, session_id: &SessionId) {
        let emptied = match self.rooms.get_mut(user_id) {
            Some(mut conns) => {
                conns.retain(|c| c.session_id != *session_id);
                conns.is_empty()
            }
            None => false,
        };

        // Clean up empty rooms
        if emptied {
            self.rooms.remove_if(user_id, |_, conns| conns.is_empty());
            tracing::debug!(user_id = %user_id, "Removed empty user room");
        } else {
            tracing::debug!(
                user_id = %user_id,
                session_id = %session_id,
                "Connection left user room"
            );
        }
    }

    /// Deliver an event to every connection of `user_id`
    ///
    /// Returns how many connections accepted it. Zero means the user is
    /// offline; nothing is queued.
    pub fn emit(&self, user_id: &UserId, event: ServerEvent) -> usize {
        // Clone the member list out so no shard lock is held while sending
        let conns = match self.rooms.get(user_id) {
            Some(conns) => conns.clone(),
            None => {
                tracing::debug!(
                    user_id = %user_id,
                    event = event.name(),
                    "No room for user - not delivered live"
                );
                return 0;
            }
        };

        let mut delivered = 0;
        for conn in &conns {
            match conn.send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            user_id = %user_id,
            event = event.name(),
            recipients = delivered,
            "Delivered event to user room"
        );
        delivered
    }

    /// Get room size (number of connections) for a user
    pub fn room_size(&self, user_id: &UserId) -> usize {
        self.rooms.get(user_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
