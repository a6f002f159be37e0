//! Message history, edits, and soft deletes

use serde::Serialize;
use uchat_shared::{ChatError, ConversationId, Message, MessageId, UserId, DELETED_SUMMARY};

use super::ChatService;
use crate::websocket::events::ServerEvent;

/// Messages exchanged with one peer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub messages: Vec<Message>,
}

impl ChatService {
    /// Non-deleted messages between `user` and `peer`, oldest first
    pub async fn history_with(
        &self,
        user: UserId,
        peer: UserId,
    ) -> Result<ConversationHistory, ChatError> {
        let Some(conversation) = self.store.find_conversation(user, peer).await? else {
            return Ok(ConversationHistory {
                conversation_id: None,
                messages: Vec::new(),
            });
        };

        let messages = self.store.list_messages(conversation.id).await?;
        Ok(ConversationHistory {
            conversation_id: Some(conversation.id),
            messages,
        })
    }

    /// Replace the text of one of `user`'s own messages
    pub async fn edit_message(
        &self,
        user: UserId,
        id: MessageId,
        new_text: &str,
    ) -> Result<Message, ChatError> {
        if new_text.trim().is_empty() {
            return Err(ChatError::InvalidPayload(
                "Message text cannot be empty".to_string(),
            ));
        }

        let message = self.owned_message(user, id, "edit").await?;
        if message.is_deleted {
            return Err(ChatError::NotFound("Message not found".to_string()));
        }

        let updated = self.store.update_message_text(id, new_text).await?;
        self.refresh_summary_if_latest(&updated, new_text).await?;
        self.notify_participants(&updated, ServerEvent::MessageEdited(updated.clone()));

        tracing::info!(message_id = %id, user_id = %user, "Message edited");
        Ok(updated)
    }

    /// Soft-delete one of `user`'s own messages
    pub async fn delete_message(&self, user: UserId, id: MessageId) -> Result<Message, ChatError> {
        self.owned_message(user, id, "delete").await?;

        let deleted = self.store.soft_delete_message(id).await?;
        self.refresh_summary_if_latest(&deleted, DELETED_SUMMARY).await?;
        self.notify_participants(
            &deleted,
            ServerEvent::MessageDeleted {
                message_id: deleted.id,
                conversation_id: deleted.conversation_id,
            },
        );

        tracing::info!(message_id = %id, user_id = %user, "Message deleted");
        Ok(deleted)
    }

    async fn owned_message(
        &self,
        user: UserId,
        id: MessageId,
        action: &str,
    ) -> Result<Message, ChatError> {
        let message = self
            .store
            .get_message(id)
            .await?
            .ok_or_else(|| ChatError::NotFound("Message not found".to_string()))?;

        if message.sender != user {
            return Err(ChatError::Forbidden(format!("You can only {action} your own messages")));
        }
        Ok(message)
    }

    async fn refresh_summary_if_latest(
        &self,
        message: &Message,
        summary: &str,
    ) -> Result<(), ChatError> {
        let written = self
            .store
            .set_last_message_if_latest(message.conversation_id, message.id, summary)
            .await?;
        if !written {
            tracing::debug!(
                message_id = %message.id,
                "Newer message exists; conversation summary left as is"
            );
        }
        Ok(())
    }

    fn notify_participants(&self, message: &Message, event: ServerEvent) {
        self.hub.emit_to_user(&message.sender, event.clone());
        if let Some(receiver) = message.receiver {
            self.hub.emit_to_user(&receiver, event);
        }
    }
}
