use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageKind;

// -- JWT Claims --

/// JWT claims shared across parley-api (REST middleware) and parley-gateway
/// (WebSocket authentication). Canonical definition lives here in parley-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub handle: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub handle: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub handle: String,
    pub token: String,
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub handle: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Public view of another user, enough to start a conversation with them.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub handle: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub participant_handle: String,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: Uuid,
}

/// Denormalized sidebar entry: the other participant's display data plus the
/// last message, ready to render. `unread` is always 0 — no read tracking
/// exists on the server.
#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub name: String,
    pub chat_image: String,
    pub last_message: String,
    pub time: String,
    pub unread: u32,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

#[derive(Debug, Serialize)]
pub struct DeleteConversationResponse {
    pub success: bool,
    pub deleted_messages: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    pub media_url: Option<String>,
    pub reply_to: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
}

/// One rendered chat bubble. `is_sent` is always true — there is no
/// delivery-state machine.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub sender_handle: String,
    pub sender: String,
    pub content: String,
    pub time: String,
    pub is_sent: bool,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub media_url: Option<String>,
}

// -- Files --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_id: Uuid,
    pub size: u64,
    pub url: String,
}
