//! Process-local [`ChatStore`]
//!
//! Each conversation lives behind its own mutex together with its messages, so
//! sends and read reconciliation on one conversation serialize while unrelated
//! conversations proceed in parallel. The lookup maps are sharded (`DashMap`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{ChatStore, StoreResult};
use crate::error::StoreError;
use crate::types::{
    Conversation, ConversationId, Message, MessageId, NewMessage, ParticipantPair, UserId,
};

#[derive(Debug)]
struct ConversationRecord {
    conversation: Conversation,
    /// Insertion order doubles as creation order
    messages: Vec<Message>,
}

impl ConversationRecord {
    fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// In-memory conversation and message store
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: DashMap<ConversationId, Arc<Mutex<ConversationRecord>>>,
    pairs: DashMap<ParticipantPair, ConversationId>,
    message_index: DashMap<MessageId, ConversationId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations created so far
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    fn record(&self, id: ConversationId) -> StoreResult<Arc<Mutex<ConversationRecord>>> {
        self.conversations
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))
    }

    fn record_for_message(&self, id: MessageId) -> StoreResult<Arc<Mutex<ConversationRecord>>> {
        let conversation_id = self
            .message_index
            .get(&id)
            .map(|r| *r.value())
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        self.record(conversation_id)
    }

    fn update_message<F>(&self, id: MessageId, apply: F) -> StoreResult<Message>
    where
        F: FnOnce(&mut Message),
    {
        let record = self.record_for_message(id)?;
        let mut record = record.lock();
        let message = record
            .message_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        apply(message);
        message.updated_at = OffsetDateTime::now_utc();
        Ok(message.clone())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn find_conversation(&self, a: UserId, b: UserId) -> StoreResult<Option<Conversation>> {
        let Some(pair) = ParticipantPair::new(a, b) else {
            return Ok(None);
        };
        let Some(id) = self.pairs.get(&pair).map(|r| *r.value()) else {
            return Ok(None);
        };
        self.get_conversation(id).await
    }

    async fn get_conversation(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        match self.record(id) {
            Ok(record) => Ok(Some(record.lock().conversation.clone())),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
        summary: &str,
    ) -> StoreResult<(Conversation, bool)> {
        let pair = ParticipantPair::new(a, b)
            .ok_or_else(|| StoreError::Conflict("participants must be distinct".to_string()))?;

        // The pair entry guard is held across creation so that racing callers
        // for the same pair observe exactly one conversation.
        match self.pairs.entry(pair) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                drop(entry);
                let record = self.record(id)?;
                let conversation = record.lock().conversation.clone();
                Ok((conversation, false))
            }
            Entry::Vacant(entry) => {
                let now = OffsetDateTime::now_utc();
                let conversation = Conversation {
                    id: ConversationId::new(),
                    participants: pair.as_array(),
                    last_message: summary.to_string(),
                    unread_count: HashMap::new(),
                    created_at: now,
                    updated_at: now,
                };
                self.conversations.insert(
                    conversation.id,
                    Arc::new(Mutex::new(ConversationRecord {
                        conversation: conversation.clone(),
                        messages: Vec::new(),
                    })),
                );
                entry.insert(conversation.id);
                tracing::debug!(conversation_id = %conversation.id, "Created conversation");
                Ok((conversation, true))
            }
        }
    }

    async fn append_message(&self, message: NewMessage, bump_unread: bool) -> StoreResult<Message> {
        let record = self.record(message.conversation_id)?;
        let now = OffsetDateTime::now_utc();
        let summary = message.summary();
        let receiver = message.receiver;
        let message = message.into_message(MessageId::new(), now);

        {
            let mut record = record.lock();
            record.messages.push(message.clone());
            let conversation = &mut record.conversation;
            conversation.last_message = summary;
            conversation.updated_at = now;
            if bump_unread {
                let count = conversation.unread_count.entry(receiver).or_insert(0);
                *count = count.saturating_add(1);
            }
            self.message_index.insert(message.id, message.conversation_id);
        }

        Ok(message)
    }

    async fn mark_seen(&self, conversation: ConversationId, reader: UserId) -> StoreResult<u64> {
        let record = self.record(conversation)?;
        let mut record = record.lock();
        let now = OffsetDateTime::now_utc();

        let mut flipped = 0;
        for message in record.messages.iter_mut().filter(|m| m.is_unseen_by(reader)) {
            message.seen = true;
            message.updated_at = now;
            flipped += 1;
        }
        // Exact under the record lock: no unseen message addressed to `reader` remains.
        record.conversation.unread_count.insert(reader, 0);

        Ok(flipped)
    }

    async fn unread_count(&self, conversation: ConversationId, user: UserId) -> StoreResult<u32> {
        let record = self.record(conversation)?;
        let count = record.lock().conversation.unread_for(user);
        Ok(count)
    }

    async fn list_messages(&self, conversation: ConversationId) -> StoreResult<Vec<Message>> {
        let record = self.record(conversation)?;
        let record = record.lock();
        Ok(record
            .messages
            .iter()
            .filter(|m| !m.is_deleted)
            .cloned()
            .collect())
    }

    async fn get_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        let record = match self.record_for_message(id) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let record = record.lock();
        Ok(record.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn update_message_text(&self, id: MessageId, text: &str) -> StoreResult<Message> {
        self.update_message(id, |m| m.text = Some(text.to_string()))
    }

    async fn soft_delete_message(&self, id: MessageId) -> StoreResult<Message> {
        self.update_message(id, |m| m.is_deleted = true)
    }

    async fn set_last_message_if_latest(
        &self,
        conversation: ConversationId,
        message: MessageId,
        summary: &str,
    ) -> StoreResult<bool> {
        let record = self.record(conversation)?;
        let mut record = record.lock();
        if record.messages.last().map(|m| m.id) != Some(message) {
            return Ok(false);
        }
        record.conversation.last_message = summary.to_string();
        record.conversation.updated_at = OffsetDateTime::now_utc();
        Ok(true)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
