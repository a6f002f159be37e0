//! Connection authenticator
//!
//! Turns the credential presented at connection time into a verified
//! [`UserId`]. The credential is the two-part string `"Bearer <jwt>"`.

use uchat_shared::UserId;

use super::jwt::{JwtError, JwtManager};

const BEARER_SCHEME: &str = "Bearer";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token missing")]
    Missing,
    #[error("Invalid token format")]
    Malformed,
    #[error(transparent)]
    Rejected(#[from] JwtError),
}

/// Split `"Bearer <token>"` into its token part
pub fn parse_bearer(credential: &str) -> Result<&str, AuthError> {
    let mut parts = credential.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::Malformed),
    }
}

/// Verifies bearer credentials against the configured signing secret
#[derive(Clone)]
pub struct Authenticator {
    jwt: JwtManager,
}

impl Authenticator {
    pub fn new(jwt: JwtManager) -> Self {
        Self { jwt }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    /// Verify a credential, yielding the identity it was issued for
    pub fn authenticate(&self, credential: Option<&str>) -> Result<UserId, AuthError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::Missing)?;
        let token = parse_bearer(credential)?;
        let claims = self.jwt.validate_token(token)?;
        Ok(UserId::from(claims.sub))
    }
}
