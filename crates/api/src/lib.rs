//! U-Chat API Library
//!
//! Real-time presence and conversation sync over WebSocket, plus the HTTP
//! message routes.

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
