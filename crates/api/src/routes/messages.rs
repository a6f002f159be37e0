//! Message history routes
//!
//! Every route runs behind `require_auth`; the acting user is the token's
//! subject, never a path or body field.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uchat_shared::{Message, MessageId, UserId};

use crate::{
    auth::AuthUser,
    chat::ConversationHistory,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    #[serde(flatten)]
    pub history: ConversationHistory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub new_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EditMessageResponse {
    pub message: &'static str,
    pub data: Message,
}

#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub message: &'static str,
}

fn parse_message_id(raw: &str) -> ApiResult<MessageId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid messageId".to_string()))
}

/// `GET /api/message/get-messages/:receiver_id`
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(receiver_id): Path<String>,
) -> ApiResult<Json<MessagesResponse>> {
    let peer: UserId = receiver_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid receiverId".to_string()))?;

    let history = state.chat.history_with(auth_user.user_id, peer).await?;
    let message = history
        .conversation_id
        .is_none()
        .then_some("No conversation found");

    Ok(Json(MessagesResponse { history, message }))
}

/// `PUT /api/message/edit-message/:message_id`
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(message_id): Path<String>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<EditMessageResponse>> {
    let id = parse_message_id(&message_id)?;
    let new_text = req.new_text.unwrap_or_default();

    let updated = state
        .chat
        .edit_message(auth_user.user_id, id, &new_text)
        .await?;

    Ok(Json(EditMessageResponse {
        message: "Message updated successfully",
        data: updated,
    }))
}

/// `DELETE /api/message/delete-message/:message_id`
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(message_id): Path<String>,
) -> ApiResult<Json<DeleteMessageResponse>> {
    let id = parse_message_id(&message_id)?;
    state.chat.delete_message(auth_user.user_id, id).await?;

    Ok(Json(DeleteMessageResponse {
        message: "Message deleted successfully",
    }))
}
