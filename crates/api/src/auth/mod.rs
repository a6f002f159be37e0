//! Authentication module for U-Chat

pub mod authenticator;
pub mod jwt;
pub mod middleware;

pub use authenticator::{parse_bearer, AuthError, Authenticator};
pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{require_auth, AuthUser};
