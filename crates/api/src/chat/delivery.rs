//! Message delivery pipeline
//!
//! 1. find or lazily create the `{sender, receiver}` conversation
//! 2. persist the message (seen = false) together with the conversation
//!    summary and, unless the receiver has this conversation open, a +1 on
//!    the receiver's unread counter
//! 3. deliver `receiveMessage` to the receiver's room, then `send-success`
//!    to the sending connection only
//!
//! Any failure aborts the pipeline and the sender gets `send-error`. Nothing
//! is retried here; retry policy belongs to the client.

use uchat_shared::{summarize, ChatError, MessageType, NewMessage, UserId};

use super::ChatService;
use crate::websocket::connection::Connection;
use crate::websocket::events::{DeliveredMessage, SendMessagePayload, ServerEvent};

/// `send-error` message for rejected payloads
pub const INVALID_PAYLOAD: &str = "Invalid message payload";

/// `send-error` message for everything else
pub const DELIVERY_FAILED: &str = "Message delivery failed";

/// A `send-message` payload that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub receiver: UserId,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub message_type: MessageType,
}

impl OutgoingMessage {
    /// Validate a raw payload on behalf of the authenticated `sender`
    pub fn validate(sender: UserId, payload: SendMessagePayload) -> Result<Self, ChatError> {
        let receiver = payload
            .receiver_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ChatError::InvalidPayload("receiverId is required".to_string()))?;
        let receiver: UserId = receiver
            .parse()
            .map_err(|_| ChatError::InvalidPayload(format!("invalid receiverId '{receiver}'")))?;
        if receiver == sender {
            return Err(ChatError::InvalidPayload(
                "receiverId must differ from the sender".to_string(),
            ));
        }

        let text = payload.text.filter(|t| !t.trim().is_empty());
        let media_url = payload.media_url.filter(|m| !m.trim().is_empty());
        if text.is_none() && media_url.is_none() {
            return Err(ChatError::InvalidPayload(
                "either text or mediaUrl is required".to_string(),
            ));
        }

        let message_type = match payload.message_type.as_deref().map(str::trim) {
            None | Some("") => MessageType::default(),
            Some(raw) => raw.parse().map_err(ChatError::InvalidPayload)?,
        };

        Ok(Self {
            receiver,
            text,
            media_url,
            message_type,
        })
    }
}

fn send_error_event(err: &ChatError) -> ServerEvent {
    let message = match err {
        ChatError::InvalidPayload(_) => INVALID_PAYLOAD,
        _ => DELIVERY_FAILED,
    };
    ServerEvent::SendError {
        message: message.to_string(),
        error: Some(err.to_string()),
    }
}

impl ChatService {
    /// Persist a message from `sender` and deliver it to the receiver's room
    ///
    /// Returns the payload that should be acknowledged to the sender.
    pub async fn send_message(
        &self,
        sender: UserId,
        payload: SendMessagePayload,
    ) -> Result<DeliveredMessage, ChatError> {
        let outgoing = OutgoingMessage::validate(sender, payload)?;
        let receiver = outgoing.receiver;

        let (conversation, is_new_conversation) = self
            .store
            .get_or_create_conversation(sender, receiver, &summarize(outgoing.text.as_deref()))
            .await?;

        let bump_unread = !self.hub.tracker.is_viewing(&receiver, &conversation.id);

        let message = self
            .store
            .append_message(
                NewMessage {
                    conversation_id: conversation.id,
                    sender,
                    receiver,
                    text: outgoing.text,
                    media_url: outgoing.media_url,
                    message_type: outgoing.message_type,
                },
                bump_unread,
            )
            .await?;

        let delivered = DeliveredMessage {
            message,
            is_new_conversation,
        };
        let live_recipients = self
            .hub
            .emit_to_user(&receiver, ServerEvent::ReceiveMessage(delivered.clone()));

        tracing::info!(
            conversation_id = %conversation.id,
            message_id = %delivered.message.id,
            sender_id = %sender,
            receiver_id = %receiver,
            is_new_conversation,
            bump_unread,
            live_recipients,
            "Message delivered"
        );

        Ok(delivered)
    }

    /// `send-message` handler: run the pipeline and answer the sending connection
    pub async fn handle_send(&self, conn: &Connection, payload: SendMessagePayload) {
        let event = match self.send_message(conn.user_id, payload).await {
            Ok(delivered) => ServerEvent::SendSuccess(delivered),
            Err(err) => {
                match &err {
                    ChatError::InvalidPayload(reason) => tracing::debug!(
                        session_id = %conn.session_id,
                        reason = %reason,
                        "Rejected send-message payload"
                    ),
                    other => tracing::error!(
                        session_id = %conn.session_id,
                        user_id = %conn.user_id,
                        error = ?other,
                        "Socket send-message error"
                    ),
                }
                send_error_event(&err)
            }
        };

        let _ = conn.send(event);
    }
}
