//! Common types used across U-Chat

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

macro_rules! id_wrapper {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

id_wrapper!(
    /// Verified user identity (JWT subject)
    UserId
);
id_wrapper!(
    /// Conversation ID wrapper
    ConversationId
);
id_wrapper!(
    /// Message ID wrapper
    MessageId
);

/// Unordered pair of two distinct participants, stored low-then-high.
///
/// `(a, b)` and `(b, a)` produce the same pair, which is what makes
/// conversation lookup and lazy creation symmetric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Returns `None` when both sides are the same identity.
    pub fn new(a: UserId, b: UserId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    pub fn as_array(&self) -> [UserId; 2] {
        [self.low, self.high]
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Kind of content carried by a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            other => Err(format!("unknown message type '{other}'")),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Conversations & Messages
// =============================================================================

/// Placeholder summary for messages that carry only media
pub const MEDIA_SUMMARY: &str = "Media";

/// Summary shown after the latest message is soft-deleted
pub const DELETED_SUMMARY: &str = "This message was deleted";

/// Two-party conversation with its denormalized summary and unread counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [UserId; 2],
    pub last_message: String,
    pub unread_count: HashMap<UserId, u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.contains(&user)
    }

    /// The participant that is not `user`, if `user` belongs to this conversation
    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user => Some(b),
            [a, b] if b == user => Some(a),
            _ => None,
        }
    }

    pub fn unread_for(&self, user: UserId) -> u32 {
        self.unread_count.get(&user).copied().unwrap_or(0)
    }
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub receiver: Option<UserId>,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub message_type: MessageType,
    pub seen: bool,
    pub is_deleted: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Message {
    /// Whether this message counts against `user`'s unread counter
    pub fn is_unseen_by(&self, user: UserId) -> bool {
        !self.seen && self.receiver == Some(user)
    }
}

/// Input for [`ChatStore::append_message`](crate::store::ChatStore::append_message)
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: UserId,
    pub receiver: UserId,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub message_type: MessageType,
}

impl NewMessage {
    /// Text used for the conversation's `lastMessage`
    pub fn summary(&self) -> String {
        summarize(self.text.as_deref())
    }

    pub(crate) fn into_message(self, id: MessageId, now: OffsetDateTime) -> Message {
        Message {
            id,
            conversation_id: self.conversation_id,
            sender: self.sender,
            receiver: Some(self.receiver),
            text: self.text,
            media_url: self.media_url,
            message_type: self.message_type,
            seen: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Render a message body as a conversation summary
pub fn summarize(text: Option<&str>) -> String {
    match text {
        Some(t) if !t.trim().is_empty() => t.to_string(),
        _ => MEDIA_SUMMARY.to_string(),
    }
}
