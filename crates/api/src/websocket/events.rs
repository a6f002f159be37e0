//! WebSocket event types and serialization
//!
//! Every frame is `{"event": <name>, "data": <payload>}`. Event names are the
//! wire contract shared with existing clients, hence the mixed casing.

use serde::{Deserialize, Serialize};
use uchat_shared::{ConversationId, Message, MessageId, UserId};

use super::connection::SessionId;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "send-message")]
    SendMessage(SendMessagePayload),

    /// Declare the conversation currently open in the client
    #[serde(rename = "active-chat")]
    ActiveChat(ActiveChatPayload),

    /// The client closed its open conversation
    #[serde(rename = "inactive-chat")]
    InactiveChat,

    #[serde(rename = "mark-seen")]
    MarkSeen(MarkSeenPayload),

    /// Heartbeat ping to keep connection alive
    #[serde(rename = "ping")]
    Ping,
}

/// Raw `send-message` payload; validated by the delivery pipeline
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub receiver_id: Option<String>,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveChatPayload {
    pub conversation_id: Option<String>,
}

/// Either field identifies the conversation; `conversationId` wins when both are set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkSeenPayload {
    pub conversation_id: Option<String>,
    pub sender_id: Option<String>,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Connection acknowledged
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { session_id: SessionId },

    /// Full set of online identities, sent whenever it changes
    #[serde(rename = "onlineUsers")]
    OnlineUsers(Vec<UserId>),

    /// Acknowledgment to the sender of a persisted message
    #[serde(rename = "send-success")]
    SendSuccess(DeliveredMessage),

    /// Live delivery to the receiver's channel
    #[serde(rename = "receiveMessage")]
    ReceiveMessage(DeliveredMessage),

    #[serde(rename = "send-error")]
    SendError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename = "unread-reset", rename_all = "camelCase")]
    UnreadReset { conversation_id: ConversationId },

    #[serde(rename = "messageEdited")]
    MessageEdited(Message),

    #[serde(rename = "messageDeleted", rename_all = "camelCase")]
    MessageDeleted {
        message_id: MessageId,
        conversation_id: ConversationId,
    },

    /// This session was superseded by a newer connection for the same user
    #[serde(rename = "session-replaced", rename_all = "camelCase")]
    SessionReplaced { session_id: SessionId },

    /// Heartbeat response
    #[serde(rename = "pong")]
    Pong,

    /// Error message
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Wire name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::OnlineUsers(_) => "onlineUsers",
            Self::SendSuccess(_) => "send-success",
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::SendError { .. } => "send-error",
            Self::UnreadReset { .. } => "unread-reset",
            Self::MessageEdited(_) => "messageEdited",
            Self::MessageDeleted { .. } => "messageDeleted",
            Self::SessionReplaced { .. } => "session-replaced",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// Message fan-out payload: the message plus conversation materialization hints
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredMessage {
    #[serde(flatten)]
    pub message: Message,
    pub is_new_conversation: bool,
}
