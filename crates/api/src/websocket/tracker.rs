//! Active-conversation tracker
//!
//! Remembers which conversation each user currently has open so the delivery
//! pipeline can skip unread increments for messages the user is looking at.
//! Process memory only: after a restart every message counts as unread until
//! the client declares its active conversation again.

use dashmap::DashMap;
use uchat_shared::{ConversationId, UserId};

use super::connection::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveEntry {
    conversation_id: ConversationId,
    /// Session that declared it; only that session's disconnect clears it
    session_id: SessionId,
}

#[derive(Debug, Default)]
pub struct ActiveConversationTracker {
    entries: DashMap<UserId, ActiveEntry>,
}

impl ActiveConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the user's active conversation
    pub fn set_active(
        &self,
        user_id: UserId,
        session_id: SessionId,
        conversation_id: ConversationId,
    ) {
        self.entries.insert(
            user_id,
            ActiveEntry {
                conversation_id,
                session_id,
            },
        );
    }

    pub fn active_for(&self, user_id: &UserId) -> Option<ConversationId> {
        self.entries.get(user_id).map(|entry| entry.conversation_id)
    }

    /// Whether `user_id` currently has `conversation_id` open
    pub fn is_viewing(&self, user_id: &UserId, conversation_id: &ConversationId) -> bool {
        self.active_for(user_id).as_ref() == Some(conversation_id)
    }

    /// Clear the user's entry if it was declared by `session_id`
    pub fn clear_for_session(&self, user_id: &UserId, session_id: &SessionId) -> bool {
        self.entries
            .remove_if(user_id, |_, entry| entry.session_id == *session_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
