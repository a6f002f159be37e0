//! PostgreSQL-backed [`ChatStore`]
//!
//! Unread counters live in `conversation_unread`, one row per
//! (conversation, participant). Sends increment the row inside the same
//! transaction that inserts the message; reads reset it before flipping
//! messages, so the row lock orders the two against each other.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ChatStore, StoreResult};
use crate::error::StoreError;
use crate::types::{
    Conversation, ConversationId, Message, MessageId, NewMessage, ParticipantPair, UserId,
};

const CONVERSATION_COLUMNS: &str =
    "id, participant_low, participant_high, last_message, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, text, media_url, \
     message_type, seen, is_deleted, created_at, updated_at";

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    participant_low: Uuid,
    participant_high: Uuid,
    last_message: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl ConversationRow {
    fn into_conversation(self, unread_count: HashMap<UserId, u32>) -> Conversation {
        Conversation {
            id: self.id.into(),
            participants: [self.participant_low.into(), self.participant_high.into()],
            last_message: self.last_message,
            unread_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    receiver_id: Option<Uuid>,
    text: Option<String>,
    media_url: Option<String>,
    message_type: String,
    seen: bool,
    is_deleted: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            sender: row.sender_id.into(),
            receiver: row.receiver_id.map(UserId::from),
            text: row.text,
            media_url: row.media_url,
            message_type: row.message_type.parse().map_err(StoreError::Database)?,
            seen: row.seen,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn count_to_u32(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

// =============================================================================
// Store
// =============================================================================

/// sqlx-backed conversation and message store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_unread(&self, id: Uuid) -> StoreResult<HashMap<UserId, u32>> {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT user_id, count FROM conversation_unread WHERE conversation_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user, count)| (UserId::from(user), count_to_u32(count)))
            .collect())
    }

    async fn hydrate(&self, row: ConversationRow) -> StoreResult<Conversation> {
        let unread = self.load_unread(row.id).await?;
        Ok(row.into_conversation(unread))
    }

    async fn conversation_by_pair(
        &self,
        pair: ParticipantPair,
    ) -> StoreResult<Option<ConversationRow>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE participant_low = $1 AND participant_high = $2"
        ))
        .bind(pair.low().as_uuid())
        .bind(pair.high().as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn conversation_exists(
        tx: &mut Transaction<'_, Postgres>,
        id: ConversationId,
    ) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1)",
        )
        .bind(id.as_uuid())
        .fetch_one(&mut **tx)
        .await?;
        Ok(exists)
    }

    async fn update_message_returning(
        &self,
        sql: &str,
        id: MessageId,
        text: Option<&str>,
    ) -> StoreResult<Message> {
        let mut query = sqlx::query_as::<_, MessageRow>(sql).bind(id.as_uuid());
        if let Some(text) = text {
            query = query.bind(text);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        row.try_into()
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn find_conversation(&self, a: UserId, b: UserId) -> StoreResult<Option<Conversation>> {
        let Some(pair) = ParticipantPair::new(a, b) else {
            return Ok(None);
        };
        match self.conversation_by_pair(pair).await? {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_conversation(&self, id: ConversationId) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
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

        let inserted = sqlx::query_as::<_, ConversationRow>(&format!(
            r#"
            INSERT INTO conversations (id, participant_low, participant_high, last_message)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (participant_low, participant_high) DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(pair.low().as_uuid())
        .bind(pair.high().as_uuid())
        .bind(summary)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.into_conversation(HashMap::new()), true));
        }

        // Lost the insert race (or it already existed)
        let row = self
            .conversation_by_pair(pair)
            .await?
            .ok_or_else(|| {
                StoreError::Database("conversation vanished after conflict".to_string())
            })?;
        Ok((self.hydrate(row).await?, false))
    }

    async fn append_message(&self, message: NewMessage, bump_unread: bool) -> StoreResult<Message> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE conversations SET last_message = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(message.conversation_id.as_uuid())
        .bind(message.summary())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }

        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, receiver_id, text, media_url, message_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(message.conversation_id.as_uuid())
        .bind(message.sender.as_uuid())
        .bind(message.receiver.as_uuid())
        .bind(message.text.as_deref())
        .bind(message.media_url.as_deref())
        .bind(message.message_type.as_str())
        .fetch_one(&mut *tx)
        .await?;

        if bump_unread {
            sqlx::query(
                r#"
                INSERT INTO conversation_unread (conversation_id, user_id, count)
                VALUES ($1, $2, 1)
                ON CONFLICT (conversation_id, user_id)
                DO UPDATE SET count = conversation_unread.count + 1
                "#,
            )
            .bind(message.conversation_id.as_uuid())
            .bind(message.receiver.as_uuid())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        row.try_into()
    }

    async fn mark_seen(&self, conversation: ConversationId, reader: UserId) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        if !Self::conversation_exists(&mut tx, conversation).await? {
            return Err(StoreError::NotFound(format!("conversation {conversation}")));
        }

        // Reset first: this takes the counter row lock, so a concurrent send
        // that still has to bump waits for us and its message stays unseen.
        sqlx::query(
            r#"
            INSERT INTO conversation_unread (conversation_id, user_id, count)
            VALUES ($1, $2, 0)
            ON CONFLICT (conversation_id, user_id) DO UPDATE SET count = 0
            "#,
        )
        .bind(conversation.as_uuid())
        .bind(reader.as_uuid())
        .execute(&mut *tx)
        .await?;

        let flipped = sqlx::query(
            r#"
            UPDATE messages SET seen = TRUE, updated_at = NOW()
            WHERE conversation_id = $1 AND receiver_id = $2 AND seen = FALSE
            "#,
        )
        .bind(conversation.as_uuid())
        .bind(reader.as_uuid())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(flipped)
    }

    async fn unread_count(&self, conversation: ConversationId, user: UserId) -> StoreResult<u32> {
        let count = sqlx::query_scalar::<_, i32>(
            "SELECT count FROM conversation_unread WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(count.map(count_to_u32).unwrap_or(0))
    }

    async fn list_messages(&self, conversation: ConversationId) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND is_deleted = FALSE ORDER BY seq ASC"
        ))
        .bind(conversation.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn get_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Message::try_from).transpose()
    }

    async fn update_message_text(&self, id: MessageId, text: &str) -> StoreResult<Message> {
        let sql = format!(
            "UPDATE messages SET text = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        self.update_message_returning(&sql, id, Some(text)).await
    }

    async fn soft_delete_message(&self, id: MessageId) -> StoreResult<Message> {
        let sql = format!(
            "UPDATE messages SET is_deleted = TRUE, updated_at = NOW() \
             WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        self.update_message_returning(&sql, id, None).await
    }

    async fn set_last_message_if_latest(
        &self,
        conversation: ConversationId,
        message: MessageId,
        summary: &str,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Sends update the conversation row before inserting, so holding its
        // lock means every committed send is visible to the next statement.
        let locked = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(conversation.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(format!("conversation {conversation}")));
        }

        let updated = sqlx::query(
            r#"
            UPDATE conversations SET last_message = $3, updated_at = NOW()
            WHERE id = $1
              AND (SELECT id FROM messages WHERE conversation_id = $1
                   ORDER BY seq DESC LIMIT 1) = $2
            "#,
        )
        .bind(conversation.as_uuid())
        .bind(message.as_uuid())
        .bind(summary)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated.rows_affected() == 1)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
