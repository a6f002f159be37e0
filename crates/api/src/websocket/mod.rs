//! WebSocket support for real-time chat
//!
//! Provides the live half of U-Chat:
//! - User presence tracking (one current connection per user)
//! - Per-user rooms for targeted delivery
//! - Active-conversation tracking for unread suppression
//!
//! # Architecture
//!
//! - **Connection**: Represents an authenticated WebSocket connection
//! - **Presence**: Most recent connection per user, with a stale-disconnect guard
//! - **Room**: User-keyed pub/sub for delivering events
//! - **Tracker**: Conversation each user currently has open
//! - **State**: Global WebSocket state shared across all connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: Type-safe event definitions for client/server communication

pub mod connection;
pub mod events;
pub mod handler;
pub mod presence;
pub mod room;
pub mod state;
pub mod tracker;

pub use handler::ws_handler;
pub use state::WebSocketState;
