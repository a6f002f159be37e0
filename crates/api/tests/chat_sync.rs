//! End-to-end conversation sync through the socket event dispatcher

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use uchat_api::{
    chat::{SeenTarget, DELIVERY_FAILED, INVALID_PAYLOAD},
    websocket::{
        connection::Connection,
        events::{ClientEvent, SendMessagePayload, ServerEvent},
        handler::handle_client_event,
    },
    AppState, Config,
};
use uchat_shared::{
    ChatStore, Conversation, ConversationId, MemoryStore, Message, MessageId, MessageType,
    NewMessage, StoreError, UserId, DELETED_SUMMARY,
};

const SECRET: &str = "test-secret-that-is-at-least-32-characters-long";

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        database_url: None,
        database_max_connections: 1,
        run_migrations: false,
        jwt_secret: SECRET.to_string(),
        jwt_leeway_seconds: 0,
    }
}

fn app_with(store: Arc<dyn ChatStore>) -> AppState {
    AppState::new(test_config(), store)
}

struct Client {
    conn: Arc<Connection>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn connect(state: &AppState, user: UserId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = state.ws_state.register(Connection::new(user, tx));
        Self { conn, rx }
    }

    fn user(&self) -> UserId {
        self.conn.user_id
    }

    async fn emit(&self, state: &AppState, frame: serde_json::Value) {
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        handle_client_event(event, &self.conn, &state.chat).await;
    }

    async fn send_text(&self, state: &AppState, to: UserId, text: &str) {
        self.emit(
            state,
            json!({"event": "send-message", "data": {"receiverId": to.to_string(), "text": text}}),
        )
        .await;
    }

    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Everything except presence chatter
    fn drain_chat(&mut self) -> Vec<ServerEvent> {
        self.drain()
            .into_iter()
            .filter(|e| !matches!(e, ServerEvent::OnlineUsers(_)))
            .collect()
    }

    fn last_online(&mut self) -> Option<Vec<UserId>> {
        self.drain().into_iter().rev().find_map(|e| match e {
            ServerEvent::OnlineUsers(users) => Some(users),
            _ => None,
        })
    }
}

async fn unread(state: &AppState, conversation: ConversationId, user: UserId) -> u32 {
    state.store.unread_count(conversation, user).await.unwrap()
}

#[tokio::test]
async fn test_first_message_creates_conversation_and_counts_unread() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&state, UserId::new());
    let mut bob = Client::connect(&state, UserId::new());
    alice.drain();
    bob.drain();

    alice.send_text(&state, bob.user(), "hello").await;

    let acked = match alice.drain_chat().as_slice() {
        [ServerEvent::SendSuccess(delivered)] => delivered.clone(),
        other => panic!("unexpected sender events {other:?}"),
    };
    assert!(acked.is_new_conversation);
    assert_eq!(acked.message.text.as_deref(), Some("hello"));
    assert!(!acked.message.seen);

    match bob.drain_chat().as_slice() {
        [ServerEvent::ReceiveMessage(delivered)] => {
            assert_eq!(delivered.message.id, acked.message.id);
            assert!(delivered.is_new_conversation);
        }
        other => panic!("unexpected receiver events {other:?}"),
    }

    let conversation = acked.message.conversation_id;
    assert_eq!(unread(&state, conversation, bob.user()).await, 1);
    assert_eq!(unread(&state, conversation, alice.user()).await, 0);

    let stored = state.store.get_conversation(conversation).await.unwrap().unwrap();
    assert_eq!(stored.last_message, "hello");

    // Second message reuses the conversation
    alice.send_text(&state, bob.user(), "again").await;
    match alice.drain_chat().as_slice() {
        [ServerEvent::SendSuccess(delivered)] => {
            assert!(!delivered.is_new_conversation);
            assert_eq!(delivered.message.conversation_id, conversation);
        }
        other => panic!("unexpected sender events {other:?}"),
    }
    assert_eq!(unread(&state, conversation, bob.user()).await, 2);
}

#[tokio::test]
async fn test_opening_conversation_resets_unread_and_flips_seen() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&state, UserId::new());
    let mut bob = Client::connect(&state, UserId::new());

    alice.send_text(&state, bob.user(), "one").await;
    alice.send_text(&state, bob.user(), "two").await;
    let conversation = match alice.drain_chat().first() {
        Some(ServerEvent::SendSuccess(delivered)) => delivered.message.conversation_id,
        other => panic!("unexpected {other:?}"),
    };
    bob.drain();

    bob.emit(
        &state,
        json!({"event": "active-chat", "data": {"conversationId": conversation.to_string()}}),
    )
    .await;

    match bob.drain_chat().as_slice() {
        [ServerEvent::UnreadReset { conversation_id }] => {
            assert_eq!(*conversation_id, conversation)
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert_eq!(unread(&state, conversation, bob.user()).await, 0);

    let messages = state.store.list_messages(conversation).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| m.seen));

    // The sender is not notified of the read
    assert!(alice.drain_chat().is_empty());
}

#[tokio::test]
async fn test_unread_tracks_active_conversation() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&state, UserId::new());
    let mut bob = Client::connect(&state, UserId::new());

    for text in ["a", "b", "c"] {
        alice.send_text(&state, bob.user(), text).await;
    }
    let conversation = match alice.drain_chat().first() {
        Some(ServerEvent::SendSuccess(delivered)) => delivered.message.conversation_id,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(unread(&state, conversation, bob.user()).await, 3);

    // While bob has the conversation open nothing is counted
    bob.emit(
        &state,
        json!({"event": "active-chat", "data": {"conversationId": conversation.to_string()}}),
    )
    .await;
    alice.send_text(&state, bob.user(), "d").await;
    alice.send_text(&state, bob.user(), "e").await;
    assert_eq!(unread(&state, conversation, bob.user()).await, 0);

    // After closing it, counting resumes
    bob.emit(&state, json!({"event": "inactive-chat"})).await;
    alice.send_text(&state, bob.user(), "f").await;
    assert_eq!(unread(&state, conversation, bob.user()).await, 1);

    // mark-seen by peer id resets it again
    bob.drain();
    bob.emit(
        &state,
        json!({"event": "mark-seen", "data": {"senderId": alice.user().to_string()}}),
    )
    .await;
    assert!(bob
        .drain_chat()
        .iter()
        .any(|e| matches!(e, ServerEvent::UnreadReset { .. })));
    assert_eq!(unread(&state, conversation, bob.user()).await, 0);
}

#[tokio::test]
async fn test_unread_reset_reaches_every_connection_of_reader() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let alice = Client::connect(&state, UserId::new());
    let bob_id = UserId::new();
    let mut bob_phone = Client::connect(&state, bob_id);
    let mut bob_laptop = Client::connect(&state, bob_id);

    alice.send_text(&state, bob_id, "hi").await;
    assert!(bob_phone
        .drain_chat()
        .iter()
        .any(|e| matches!(e, ServerEvent::ReceiveMessage(_))));
    assert!(bob_laptop
        .drain_chat()
        .iter()
        .any(|e| matches!(e, ServerEvent::ReceiveMessage(_))));

    bob_laptop
        .emit(
            &state,
            json!({"event": "mark-seen", "data": {"senderId": alice.user().to_string()}}),
        )
        .await;

    for client in [&mut bob_phone, &mut bob_laptop] {
        assert!(client
            .drain_chat()
            .iter()
            .any(|e| matches!(e, ServerEvent::UnreadReset { .. })));
    }
}

#[tokio::test]
async fn test_concurrent_first_messages_share_one_conversation() {
    let memory = Arc::new(MemoryStore::new());
    let state = app_with(memory.clone());
    let alice = UserId::new();
    let bob = UserId::new();

    let mut handles = Vec::new();
    for i in 0..16 {
        let chat = state.chat.clone();
        let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
        handles.push(tokio::spawn(async move {
            let payload = serde_json::from_value(json!({
                "receiverId": to.to_string(),
                "text": format!("msg {i}"),
            }))
            .unwrap();
            chat.send_message(from, payload).await.unwrap()
        }));
    }

    let mut delivered = Vec::new();
    for handle in handles {
        delivered.push(handle.await.unwrap());
    }

    assert_eq!(memory.conversation_count(), 1);
    assert_eq!(delivered.iter().filter(|d| d.is_new_conversation).count(), 1);

    let conversation = delivered[0].message.conversation_id;
    assert!(delivered
        .iter()
        .all(|d| d.message.conversation_id == conversation));
    assert_eq!(unread(&state, conversation, alice).await, 8);
    assert_eq!(unread(&state, conversation, bob).await, 8);
}

#[tokio::test]
async fn test_invalid_payload_gets_send_error() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&state, UserId::new());
    alice.drain();

    alice
        .emit(&state, json!({"event": "send-message", "data": {"text": "no receiver"}}))
        .await;
    alice
        .emit(
            &state,
            json!({
                "event": "send-message",
                "data": {"receiverId": alice.user().to_string(), "text": "me"},
            }),
        )
        .await;

    let events = alice.drain_chat();
    assert_eq!(events.len(), 2);
    for event in events {
        match event {
            ServerEvent::SendError { message, .. } => assert_eq!(message, INVALID_PAYLOAD),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    /// Every message write fails
    BrokenWrites,
    /// A reply from the peer lands right before the summary refresh
    ReplyBeforeSummary,
}

/// In-memory store with one injected fault
struct FaultyStore {
    inner: MemoryStore,
    fault: Fault,
}

impl FaultyStore {
    fn new(fault: Fault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault,
        }
    }
}

#[async_trait]
impl ChatStore for FaultyStore {
    async fn find_conversation(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Conversation>, StoreError> {
        self.inner.find_conversation(a, b).await
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        self.inner.get_conversation(id).await
    }

    async fn get_or_create_conversation(
        &self,
        a: UserId,
        b: UserId,
        summary: &str,
    ) -> Result<(Conversation, bool), StoreError> {
        self.inner.get_or_create_conversation(a, b, summary).await
    }

    async fn append_message(&self, message: NewMessage, bump: bool) -> Result<Message, StoreError> {
        if self.fault == Fault::BrokenWrites {
            return Err(StoreError::Database("disk full".to_string()));
        }
        self.inner.append_message(message, bump).await
    }

    async fn mark_seen(
        &self,
        conversation: ConversationId,
        reader: UserId,
    ) -> Result<u64, StoreError> {
        self.inner.mark_seen(conversation, reader).await
    }

    async fn unread_count(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> Result<u32, StoreError> {
        self.inner.unread_count(conversation, user).await
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        self.inner.list_messages(conversation).await
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        self.inner.get_message(id).await
    }

    async fn update_message_text(&self, id: MessageId, text: &str) -> Result<Message, StoreError> {
        self.inner.update_message_text(id, text).await
    }

    async fn soft_delete_message(&self, id: MessageId) -> Result<Message, StoreError> {
        self.inner.soft_delete_message(id).await
    }

    async fn set_last_message_if_latest(
        &self,
        conversation: ConversationId,
        message: MessageId,
        summary: &str,
    ) -> Result<bool, StoreError> {
        if self.fault == Fault::ReplyBeforeSummary {
            let original = self.inner.get_message(message).await?.unwrap();
            let reply = NewMessage {
                conversation_id: conversation,
                sender: original.receiver.unwrap(),
                receiver: original.sender,
                text: Some("newer".to_string()),
                media_url: None,
                message_type: MessageType::Text,
            };
            self.inner.append_message(reply, true).await?;
        }
        self.inner
            .set_last_message_if_latest(conversation, message, summary)
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        match self.fault {
            Fault::BrokenWrites => Err(StoreError::Database("unavailable".to_string())),
            Fault::ReplyBeforeSummary => Ok(()),
        }
    }
}

fn text_to(receiver: UserId, text: &str) -> SendMessagePayload {
    SendMessagePayload {
        receiver_id: Some(receiver.to_string()),
        text: Some(text.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_persistence_failure_reports_send_error_and_delivers_nothing() {
    let state = app_with(Arc::new(FaultyStore::new(Fault::BrokenWrites)));
    let mut alice = Client::connect(&state, UserId::new());
    let mut bob = Client::connect(&state, UserId::new());
    alice.drain();
    bob.drain();

    alice.send_text(&state, bob.user(), "lost").await;

    match alice.drain_chat().as_slice() {
        [ServerEvent::SendError { message, error }] => {
            assert_eq!(message, DELIVERY_FAILED);
            assert!(error.as_deref().is_some_and(|e| e.contains("disk full")));
        }
        other => panic!("unexpected sender events {other:?}"),
    }
    assert!(bob.drain_chat().is_empty());

    // The connection stays usable
    alice.emit(&state, json!({"event": "ping"})).await;
    assert!(matches!(alice.drain_chat().as_slice(), [ServerEvent::Pong]));
}

#[tokio::test]
async fn test_presence_follows_connect_and_disconnect() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let mut alice = Client::connect(&state, UserId::new());
    let mut bob = Client::connect(&state, UserId::new());

    let online = bob.last_online().unwrap();
    assert_eq!(online.len(), 2);
    assert!(online.contains(&alice.user()) && online.contains(&bob.user()));
    alice.drain();

    state.ws_state.unregister(&alice.conn);
    assert_eq!(bob.last_online().unwrap(), vec![bob.user()]);
    assert!(!state.ws_state.presence.is_online(&alice.user()));
}

#[tokio::test]
async fn test_stale_disconnect_keeps_newer_session_online() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let alice = UserId::new();
    let mut first = Client::connect(&state, alice);
    let second = Client::connect(&state, alice);
    let mut observer = Client::connect(&state, UserId::new());

    assert!(first
        .drain()
        .iter()
        .any(|e| matches!(
            e,
            ServerEvent::SessionReplaced { session_id }
                if *session_id == second.conn.session_id
        )));

    observer.drain();
    state.ws_state.unregister(&first.conn);

    assert!(state.ws_state.presence.is_online(&alice));
    assert_eq!(
        state.ws_state.presence.current(&alice).map(|c| c.session_id),
        Some(second.conn.session_id)
    );
    // No presence change, so no broadcast
    assert!(observer.last_online().is_none());
}

#[tokio::test]
async fn test_disconnect_clears_only_own_active_conversation() {
    let state = app_with(Arc::new(MemoryStore::new()));
    let bob = UserId::new();
    let phone = Client::connect(&state, bob);
    let laptop = Client::connect(&state, bob);
    let conversation = ConversationId::new();

    laptop
        .emit(
            &state,
            json!({"event": "active-chat", "data": {"conversationId": conversation.to_string()}}),
        )
        .await;

    state.ws_state.unregister(&phone.conn);
    assert!(state.ws_state.tracker.is_viewing(&bob, &conversation));

    state.ws_state.unregister(&laptop.conn);
    assert!(!state.ws_state.tracker.is_viewing(&bob, &conversation));
}

#[tokio::test]
async fn test_edit_and_delete_keep_newer_reply_as_summary() {
    let state = app_with(Arc::new(FaultyStore::new(Fault::ReplyBeforeSummary)));
    let alice = UserId::new();
    let bob = UserId::new();

    let sent = state.chat.send_message(alice, text_to(bob, "typo")).await.unwrap();
    let conversation = sent.message.conversation_id;

    let edited = state
        .chat
        .edit_message(alice, sent.message.id, "edited")
        .await
        .unwrap();
    assert_eq!(edited.text.as_deref(), Some("edited"));
    let summary = state.store.get_conversation(conversation).await.unwrap().unwrap();
    assert_eq!(summary.last_message, "newer");

    state.chat.delete_message(alice, sent.message.id).await.unwrap();
    let summary = state.store.get_conversation(conversation).await.unwrap().unwrap();
    assert_ne!(summary.last_message, DELETED_SUMMARY);
    assert_eq!(summary.last_message, "newer");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_and_reads_keep_unread_exact() {
    for _ in 0..25 {
        let state = app_with(Arc::new(MemoryStore::new()));
        let alice = UserId::new();
        let bob = UserId::new();

        let first = state.chat.send_message(alice, text_to(bob, "start")).await.unwrap();
        let conversation = first.message.conversation_id;

        let mut handles = Vec::new();
        for i in 0..20 {
            let chat = state.chat.clone();
            handles.push(tokio::spawn(async move {
                chat.send_message(alice, text_to(bob, &format!("m{i}")))
                    .await
                    .map(|_| ())
            }));

            let chat = state.chat.clone();
            handles.push(tokio::spawn(async move {
                chat.mark_seen(bob, SeenTarget::Conversation(conversation))
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let messages = state.store.list_messages(conversation).await.unwrap();
        assert_eq!(messages.len(), 21);
        let unseen = messages.iter().filter(|m| m.is_unseen_by(bob)).count();
        assert_eq!(unread(&state, conversation, bob).await as usize, unseen);

        // Once settled, one more read clears everything
        state
            .chat
            .mark_seen(bob, SeenTarget::Conversation(conversation))
            .await
            .unwrap();
        assert_eq!(unread(&state, conversation, bob).await, 0);
        let messages = state.store.list_messages(conversation).await.unwrap();
        assert!(messages.iter().all(|m| !m.is_unseen_by(bob)));
    }
}
