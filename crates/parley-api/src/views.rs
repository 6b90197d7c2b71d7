use tracing::warn;
use uuid::Uuid;

use parley_db::models::{MediaRow, MessageRow, UserRow};
use parley_types::api::{MediaView, MessageView, UserProfile};
use parley_types::media::MediaKind;

use crate::storage::ObjectStore;

pub fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str, what: &str) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS[.SSS]"
            // without timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} timestamp '{}': {}", what, raw, e);
            chrono::DateTime::default()
        })
}

/// Resolve a user row to its API profile, turning a stored avatar
/// reference into a fetchable URL. References that are already absolute
/// URLs pass through untouched.
pub fn profile(row: &UserRow, storage: &dyn ObjectStore) -> UserProfile {
    let avatar_url = row.avatar_ref.as_deref().and_then(|r| {
        if r.starts_with("http") {
            Some(r.to_string())
        } else {
            storage.url_for(r)
        }
    });

    UserProfile {
        id: parse_uuid(&row.id, "user id"),
        name: row.name.clone(),
        avatar_url,
        preferred_language: row.preferred_language.clone(),
    }
}

pub fn media_view(row: MediaRow, storage: &dyn ObjectStore) -> MediaView {
    let kind = MediaKind::parse(&row.kind).unwrap_or_else(|| {
        warn!("Unknown media kind '{}' on message '{}'", row.kind, row.message_id);
        MediaKind::File
    });

    let url = storage.url_for(&row.storage_ref);

    MediaView {
        storage_ref: row.storage_ref,
        kind,
        file_name: row.file_name,
        file_size: row.file_size,
        mime_type: row.mime_type,
        duration_ms: row.duration_ms,
        width: row.width,
        height: row.height,
        url,
    }
}

pub fn message_view(row: MessageRow, sender: UserProfile, media: Vec<MediaView>) -> MessageView {
    MessageView {
        id: parse_uuid(&row.id, "message id"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation id"),
        sender,
        content: row.content,
        media,
        created_at: parse_timestamp(&row.created_at, "message"),
    }
}
