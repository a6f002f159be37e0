//! Conversation synchronization engine
//!
//! - **delivery**: validate, persist, count, and fan out `send-message`
//! - **read_receipts**: `active-chat` / `mark-seen` reconciliation
//! - **history**: message listing, edit, and soft delete for the HTTP routes
//!
//! The service never trusts identities from payloads: the acting user always
//! comes from the authenticated connection or request.

mod delivery;
mod history;
mod read_receipts;

pub use delivery::{OutgoingMessage, DELIVERY_FAILED, INVALID_PAYLOAD};
pub use history::ConversationHistory;
pub use read_receipts::SeenTarget;

use std::sync::Arc;

use uchat_shared::ChatStore;

use crate::websocket::WebSocketState;

/// Chat operations over the store and the live connection hub
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    hub: WebSocketState,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, hub: WebSocketState) -> Self {
        Self { store, hub }
    }
}
