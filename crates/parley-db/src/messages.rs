use crate::models::{MediaRow, MessageRow, NewMediaItem};
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    /// Insert a message, its attachments, and the per-recipient read
    /// markers in a single transaction. The fan-out is atomic with the
    /// message insert, so an unread-count reader never observes the
    /// message without its markers. The sender gets no marker.
    pub fn insert_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        media: &[NewMediaItem],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, conversation_id, sender_id, content],
            )?;

            for (position, item) in media.iter().enumerate() {
                tx.execute(
                    "INSERT INTO message_media
                     (message_id, position, storage_ref, kind, file_name, file_size,
                      mime_type, duration_ms, width, height)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        id,
                        position as i64,
                        item.storage_ref,
                        item.kind,
                        item.file_name,
                        item.file_size,
                        item.mime_type,
                        item.duration_ms,
                        item.width,
                        item.height,
                    ],
                )?;
            }

            tx.execute(
                "INSERT INTO read_markers (message_id, user_id, conversation_id, is_read)
                 SELECT ?1, user_id, ?2, 0
                 FROM conversation_participants
                 WHERE conversation_id = ?2 AND user_id != ?3",
                rusqlite::params![id, conversation_id, sender_id],
            )?;

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    /// Messages of a conversation in ascending creation order; rowid
    /// breaks ties within the same timestamp, so order is insertion
    /// order (messages are never deleted).
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, conversation_id))
    }

    pub fn last_message(&self, conversation_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
            )?;
            let row = stmt
                .query_row([conversation_id], map_message_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Batch-fetch attachments for a set of message IDs, ordered by
    /// their position within each message.
    pub fn get_media_for_messages(&self, message_ids: &[String]) -> Result<Vec<MediaRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, position, storage_ref, kind, file_name, file_size,
                        mime_type, duration_ms, width, height
                 FROM message_media WHERE message_id IN ({})
                 ORDER BY message_id, position",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(MediaRow {
                        message_id: row.get(0)?,
                        position: row.get(1)?,
                        storage_ref: row.get(2)?,
                        kind: row.get(3)?,
                        file_name: row.get(4)?,
                        file_size: row.get(5)?,
                        mime_type: row.get(6)?,
                        duration_ms: row.get(7)?,
                        width: row.get(8)?,
                        height: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, content, created_at
         FROM messages WHERE conversation_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([conversation_id], map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
