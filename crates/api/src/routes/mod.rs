//! API routes

pub mod health;
pub mod messages;

use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    // Message history routes (JWT required)
    let message_routes = Router::new()
        .route("/get-messages/:receiver_id", get(messages::get_messages))
        .route("/edit-message/:message_id", put(messages::edit_message))
        .route("/delete-message/:message_id", delete(messages::delete_message))
        .layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            require_auth,
        ));

    // WebSocket route (auth handled in handler via header or query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/message", message_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
