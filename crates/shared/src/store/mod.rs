//! Persistence layer for conversations and messages
//!
//! The chat engine only talks to [`ChatStore`]. Two implementations ship:
//!
//! - [`MemoryStore`]: process-local, used for development and tests
//! - [`PgStore`]: PostgreSQL via sqlx
//!
//! # Unread counters
//!
//! Counters are never read-modified-written by callers. A send increments by
//! exactly one inside [`ChatStore::append_message`], and a read resets inside
//! [`ChatStore::mark_seen`]. Each implementation orders those two units of work
//! against each other per conversation, so a message is either flipped to seen
//! *and* excluded from the counter, or left unseen *and* counted.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Conversation, ConversationId, Message, MessageId, NewMessage, UserId};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Find the conversation whose participant set is exactly `{a, b}`
    async fn find_conversation(&self, a: UserId, b: UserId) -> StoreResult<Option<Conversation>>;

    async fn get_conversation(&self, id: ConversationId) -> StoreResult<Option<Conversation>>;

    /// Look up the `{a, b}` conversation, creating it with `summary` as its
    /// `lastMessage` if absent. Returns `true` in the second slot when this
    /// call created it. Concurrent callers for the same pair agree on one row.
    async fn get_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
        summary: &str,
    ) -> StoreResult<(Conversation, bool)>;

    /// Insert a message (seen = false), set the conversation's `lastMessage`,
    /// and, when `bump_unread` is set, increment the receiver's counter by one.
    async fn append_message(&self, message: NewMessage, bump_unread: bool) -> StoreResult<Message>;

    /// Flip every unseen message addressed to `reader` and reset their counter
    /// as one checkpoint. Returns how many messages were flipped.
    async fn mark_seen(&self, conversation: ConversationId, reader: UserId) -> StoreResult<u64>;

    async fn unread_count(&self, conversation: ConversationId, user: UserId) -> StoreResult<u32>;

    /// Non-deleted messages, oldest first
    async fn list_messages(&self, conversation: ConversationId) -> StoreResult<Vec<Message>>;

    async fn get_message(&self, id: MessageId) -> StoreResult<Option<Message>>;

    async fn update_message_text(&self, id: MessageId, text: &str) -> StoreResult<Message>;

    async fn soft_delete_message(&self, id: MessageId) -> StoreResult<Message>;

    /// Set the conversation's `lastMessage` to `summary`, but only while
    /// `message` is still its most recent message (deleted or not). The check
    /// and the write are one step with respect to `append_message`.
    ///
    /// Returns whether the summary was written.
    async fn set_last_message_if_latest(
        &self,
        conversation: ConversationId,
        message: MessageId,
        summary: &str,
    ) -> StoreResult<bool>;

    /// Cheap connectivity check
    async fn ping(&self) -> StoreResult<()>;
}
