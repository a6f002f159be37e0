//! Active-conversation declarations and read-receipt reconciliation
//!
//! `mark_seen` hands the flip-and-reset to [`ChatStore::mark_seen`], which
//! orders it against concurrent sends on the same conversation. A message that
//! lands after that checkpoint stays unseen and keeps its +1.
//!
//! [`ChatStore::mark_seen`]: uchat_shared::ChatStore::mark_seen

use uchat_shared::{ChatError, ConversationId, UserId};

use super::ChatService;
use crate::websocket::connection::Connection;
use crate::websocket::events::{ActiveChatPayload, MarkSeenPayload, ServerEvent};

/// What a `mark-seen` request refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenTarget {
    Conversation(ConversationId),
    /// The conversation shared with this peer
    Peer(UserId),
}

impl SeenTarget {
    /// `None` when the payload names nothing, which is a no-op
    pub fn from_payload(payload: &MarkSeenPayload) -> Result<Option<Self>, ChatError> {
        if let Some(raw) = non_blank(payload.conversation_id.as_deref()) {
            let id = raw
                .parse()
                .map_err(|_| ChatError::InvalidPayload(format!("invalid conversationId '{raw}'")))?;
            return Ok(Some(Self::Conversation(id)));
        }
        if let Some(raw) = non_blank(payload.sender_id.as_deref()) {
            let peer = raw
                .parse()
                .map_err(|_| ChatError::InvalidPayload(format!("invalid senderId '{raw}'")))?;
            return Ok(Some(Self::Peer(peer)));
        }
        Ok(None)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl ChatService {
    /// Record `conn`'s open conversation, then reconcile its read state
    pub async fn set_active(
        &self,
        conn: &Connection,
        payload: &ActiveChatPayload,
    ) -> Result<Option<ConversationId>, ChatError> {
        let raw = non_blank(payload.conversation_id.as_deref())
            .ok_or_else(|| ChatError::InvalidPayload("conversationId is required".to_string()))?;
        let conversation_id: ConversationId = raw
            .parse()
            .map_err(|_| ChatError::InvalidPayload(format!("invalid conversationId '{raw}'")))?;

        self.hub
            .tracker
            .set_active(conn.user_id, conn.session_id, conversation_id);
        tracing::debug!(
            user_id = %conn.user_id,
            conversation_id = %conversation_id,
            "Active conversation set"
        );

        self.mark_seen(conn.user_id, SeenTarget::Conversation(conversation_id))
            .await
    }

    /// Drop `conn`'s active conversation, if it declared the current one
    pub fn clear_active(&self, conn: &Connection) -> bool {
        self.hub
            .tracker
            .clear_for_session(&conn.user_id, &conn.session_id)
    }

    /// Flip `reader`'s unseen messages, reset their counter, and echo
    /// `unread-reset` to every connection of `reader`
    ///
    /// Returns the reconciled conversation, or `None` when there was nothing
    /// to reconcile (no such conversation, or `reader` is not in it).
    pub async fn mark_seen(
        &self,
        reader: UserId,
        target: SeenTarget,
    ) -> Result<Option<ConversationId>, ChatError> {
        let conversation = match target {
            SeenTarget::Conversation(id) => self.store.get_conversation(id).await?,
            SeenTarget::Peer(peer) => self.store.find_conversation(reader, peer).await?,
        };

        let Some(conversation) = conversation.filter(|c| c.has_participant(reader)) else {
            tracing::debug!(
                user_id = %reader,
                target = ?target,
                "mark-seen: no matching conversation"
            );
            return Ok(None);
        };

        let flipped = self.store.mark_seen(conversation.id, reader).await?;
        self.hub.emit_to_user(
            &reader,
            ServerEvent::UnreadReset {
                conversation_id: conversation.id,
            },
        );

        tracing::info!(
            user_id = %reader,
            conversation_id = %conversation.id,
            flipped,
            "Unread state reset"
        );
        Ok(Some(conversation.id))
    }

    /// `active-chat` handler
    pub async fn handle_active_chat(&self, conn: &Connection, payload: ActiveChatPayload) {
        if let Err(err) = self.set_active(conn, &payload).await {
            report_error(conn, "active-chat", &err);
        }
    }

    /// `mark-seen` handler; there is no acknowledgment beyond `unread-reset`
    pub async fn handle_mark_seen(&self, conn: &Connection, payload: MarkSeenPayload) {
        let result = match SeenTarget::from_payload(&payload) {
            Ok(Some(target)) => self.mark_seen(conn.user_id, target).await.map(|_| ()),
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            report_error(conn, "mark-seen", &err);
        }
    }
}

fn report_error(conn: &Connection, event: &'static str, err: &ChatError) {
    tracing::warn!(
        session_id = %conn.session_id,
        user_id = %conn.user_id,
        event,
        error = ?err,
        "Socket event failed"
    );
    let _ = conn.send(ServerEvent::Error {
        message: err.to_string(),
    });
}
