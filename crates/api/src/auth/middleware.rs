//! HTTP authentication middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uchat_shared::UserId;

use super::authenticator::Authenticator;
use crate::error::ApiError;

/// Authenticated caller attached to request extensions
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// Require a valid `Authorization: Bearer <jwt>` header
pub async fn require_auth(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let user_id = authenticator.authenticate(credential).map_err(|e| {
        tracing::debug!(error = %e, "HTTP authentication failed");
        ApiError::Unauthorized(e.to_string())
    })?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}
