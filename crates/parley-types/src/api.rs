use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::media::MediaKind;

// -- JWT Claims --

/// JWT claims issued by the external auth provider. `sub` is the
/// provider's opaque identity string; the server maps it to an internal
/// user row on first sight. Canonical definition lives here so the REST
/// middleware and handlers share one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    pub exp: usize,
}

// -- Users --

#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub preferred_language: Option<String>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    /// Participants besides the caller; the caller is always added.
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_group: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateConversationResponse {
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub is_group: bool,
    /// Group: stored name. 1:1: the other participant's name.
    pub name: String,
    pub image_url: Option<String>,
    pub participants: Vec<UserProfile>,
    pub last_message: Option<MessageView>,
    pub unread_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub media: Vec<MediaUpload>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: UserProfile,
    pub content: String,
    pub media: Vec<MediaView>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub message_ids: Vec<Uuid>,
}

// -- Media --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaUpload {
    /// Object-store reference produced by the upload service.
    pub storage_ref: String,
    pub kind: MediaKind,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MediaView {
    pub storage_ref: String,
    pub kind: MediaKind,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    /// Resolved fetch URL, `None` when the stored object is gone.
    pub url: Option<String>,
}

// -- Translation --

#[derive(Debug, Serialize)]
pub struct TranslationResponse {
    pub message_id: Uuid,
    pub language: String,
    pub text: String,
    /// False when the upstream was unavailable and `text` is the
    /// original message content.
    pub translated: bool,
}
