use crate::models::ReadMarkerRow;
use crate::{Database, OptionalExt};
use anyhow::Result;

impl Database {
    /// Acknowledge a batch of messages as read by `user_id`.
    ///
    /// Upsert per message: a missing marker (fan-out raced) is created
    /// already-read; an existing one is patched 0 -> 1. The flag never
    /// reverts, so re-acking is a no-op and calls are safe out of
    /// order.
    ///
    /// The insert selects from the messages table, so the marker's
    /// conversation is always the message's real conversation; ids
    /// outside `conversation_id` and the sender's own messages are
    /// skipped rather than written.
    pub fn mark_read(
        &self,
        user_id: &str,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for message_id in message_ids {
                tx.execute(
                    "INSERT INTO read_markers (message_id, user_id, conversation_id, is_read)
                     SELECT m.id, ?2, m.conversation_id, 1
                     FROM messages m
                     WHERE m.id = ?1 AND m.conversation_id = ?3 AND m.sender_id != ?2
                     ON CONFLICT (message_id, user_id) DO UPDATE SET is_read = 1",
                    rusqlite::params![message_id, user_id, conversation_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Unread messages for a user in one conversation. Served by the
    /// (user_id, conversation_id, is_read) index, not a message scan.
    pub fn unread_count(&self, user_id: &str, conversation_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM read_markers
                 WHERE user_id = ?1 AND conversation_id = ?2 AND is_read = 0",
                [user_id, conversation_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn get_marker(&self, message_id: &str, user_id: &str) -> Result<Option<ReadMarkerRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT message_id, user_id, conversation_id, is_read
                     FROM read_markers WHERE message_id = ?1 AND user_id = ?2",
                    [message_id, user_id],
                    |row| {
                        Ok(ReadMarkerRow {
                            message_id: row.get(0)?,
                            user_id: row.get(1)?,
                            conversation_id: row.get(2)?,
                            is_read: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use uuid::Uuid;

    fn seed_user(db: &Database, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.resolve_user(&id, &format!("ext-{}", id), name, "", None)
            .unwrap()
            .id
    }

    fn setup() -> (Database, String, String, String) {
        let db = Database::open_in_memory().unwrap();
        let sender = seed_user(&db, "s");
        let recipient = seed_user(&db, "r");
        let cid = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some("key"),
                &[sender.clone(), recipient.clone()],
            )
            .unwrap();
        (db, cid, sender, recipient)
    }

    #[test]
    fn mark_read_is_idempotent() {
        let (db, cid, sender, recipient) = setup();
        let mid = Uuid::new_v4().to_string();
        db.insert_message(&mid, &cid, &sender, "hi", &[]).unwrap();

        db.mark_read(&recipient, &cid, &[mid.clone()]).unwrap();
        db.mark_read(&recipient, &cid, &[mid.clone()]).unwrap();

        let marker = db.get_marker(&mid, &recipient).unwrap().unwrap();
        assert!(marker.is_read);
        assert_eq!(db.unread_count(&recipient, &cid).unwrap(), 0);
    }

    #[test]
    fn mark_read_creates_missing_marker() {
        let (db, cid, sender, recipient) = setup();
        let mid = Uuid::new_v4().to_string();
        db.insert_message(&mid, &cid, &sender, "hi", &[]).unwrap();

        // Simulate a raced fan-out by acking a marker that was dropped.
        db.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM read_markers WHERE message_id = ?1 AND user_id = ?2",
                [mid.as_str(), recipient.as_str()],
            )?;
            Ok(())
        })
        .unwrap();
        assert!(db.get_marker(&mid, &recipient).unwrap().is_none());

        db.mark_read(&recipient, &cid, &[mid.clone()]).unwrap();
        let marker = db.get_marker(&mid, &recipient).unwrap().unwrap();
        assert!(marker.is_read);
    }

    #[test]
    fn mark_read_skips_messages_from_other_conversations() {
        let (db, cid, sender, recipient) = setup();
        let outsider = seed_user(&db, "o");
        let other_cid = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some("other-key"),
                &[sender.clone(), outsider.clone()],
            )
            .unwrap();
        let foreign_mid = Uuid::new_v4().to_string();
        db.insert_message(&foreign_mid, &other_cid, &sender, "psst", &[])
            .unwrap();

        // `recipient` is not in `other_cid`; acking its message through
        // the conversation they do belong to must not write a marker.
        db.mark_read(&recipient, &cid, &[foreign_mid.clone()]).unwrap();

        assert!(db.get_marker(&foreign_mid, &recipient).unwrap().is_none());
        assert_eq!(db.unread_count(&outsider, &other_cid).unwrap(), 1);
    }

    #[test]
    fn mark_read_never_creates_marker_for_own_message() {
        let (db, cid, sender, _recipient) = setup();
        let mid = Uuid::new_v4().to_string();
        db.insert_message(&mid, &cid, &sender, "hi", &[]).unwrap();

        db.mark_read(&sender, &cid, &[mid.clone()]).unwrap();

        assert!(db.get_marker(&mid, &sender).unwrap().is_none());
    }

    #[test]
    fn unread_count_tracks_acks() {
        let (db, cid, sender, recipient) = setup();
        let mids: Vec<String> = (0..4).map(|_| Uuid::new_v4().to_string()).collect();
        for mid in &mids {
            db.insert_message(mid, &cid, &sender, "hi", &[]).unwrap();
        }
        assert_eq!(db.unread_count(&recipient, &cid).unwrap(), 4);

        db.mark_read(&recipient, &cid, &mids[..2].to_vec()).unwrap();
        assert_eq!(db.unread_count(&recipient, &cid).unwrap(), 2);

        db.mark_read(&recipient, &cid, &mids).unwrap();
        assert_eq!(db.unread_count(&recipient, &cid).unwrap(), 0);
    }
}
