//! U-Chat Shared Types and Utilities
//!
//! This crate contains the domain types, errors, and the persistence layer
//! shared by the U-Chat server components.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{ChatStore, MemoryStore, PgStore};
pub use types::*;
