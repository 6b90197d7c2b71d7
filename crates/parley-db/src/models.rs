/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub avatar_ref: Option<String>,
    pub preferred_language: Option<String>,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub image_ref: Option<String>,
    pub canonical_key: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: String,
}

pub struct MediaRow {
    pub message_id: String,
    pub position: i64,
    pub storage_ref: String,
    pub kind: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// Attachment payload for a message insert; position is assigned from
/// the slice order.
pub struct NewMediaItem {
    pub storage_ref: String,
    pub kind: String,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub duration_ms: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

pub struct ReadMarkerRow {
    pub message_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub is_read: bool,
}
