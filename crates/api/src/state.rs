//! Application state shared across handlers

use std::sync::Arc;

use uchat_shared::ChatStore;

use crate::auth::{Authenticator, JwtManager};
use crate::chat::ChatService;
use crate::config::Config;
use crate::websocket::WebSocketState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ChatStore>,
    pub authenticator: Authenticator,
    pub ws_state: WebSocketState,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        let authenticator = Authenticator::new(JwtManager::new(
            &config.jwt_secret,
            config.jwt_leeway_seconds,
        ));
        let ws_state = WebSocketState::new();
        let chat = ChatService::new(store.clone(), ws_state.clone());

        Self {
            config: Arc::new(config),
            store,
            authenticator,
            ws_state,
            chat,
        }
    }
}
