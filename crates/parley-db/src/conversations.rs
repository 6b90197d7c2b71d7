use crate::models::ConversationRow;
use crate::{Database, OptionalExt};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use tracing::debug;

impl Database {
    /// Insert a conversation and its participant set in one transaction.
    ///
    /// For non-group conversations the partial unique index on
    /// `canonical_key` is the de-duplication guarantee: if a concurrent
    /// caller already inserted the same pair, the constraint fires and
    /// we return the winner's id instead.
    pub fn create_conversation(
        &self,
        id: &str,
        is_group: bool,
        name: Option<&str>,
        image_ref: Option<&str>,
        canonical_key: Option<&str>,
        participant_ids: &[String],
    ) -> Result<String> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations (id, is_group, name, image_ref, canonical_key)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, is_group, name, image_ref, canonical_key],
            )?;

            if inserted == 0 {
                // Lost the canonical-key race; converge on the winner.
                drop(tx);
                let key = canonical_key
                    .ok_or_else(|| anyhow!("Conversation insert conflicted without a key"))?;
                let existing = query_direct_by_key(conn, key)?
                    .ok_or_else(|| anyhow!("Conflicting conversation not found for key {}", key))?;
                debug!("Canonical-key race lost, reusing conversation {}", existing.id);
                return Ok(existing.id);
            }

            for user_id in participant_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                     VALUES (?1, ?2)",
                    rusqlite::params![id, user_id],
                )?;
            }

            tx.commit()?;
            Ok(id.to_string())
        })
    }

    /// Lookup an existing two-party conversation by canonical key.
    pub fn find_direct_conversation(&self, key: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_direct_by_key(conn, key))
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, is_group, name, image_ref, canonical_key, created_at
                 FROM conversations WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], map_conversation_row).optional()?;
            Ok(row)
        })
    }

    /// All conversations the user participates in, unordered; recency
    /// ordering is applied by the query layer after last messages are
    /// resolved.
    pub fn list_conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.is_group, c.name, c.image_ref, c.canonical_key, c.created_at
                 FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.id
                 WHERE cp.user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], map_conversation_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn participants_of(&self, conversation_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM conversation_participants
                 WHERE conversation_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT 1 FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id = ?2 LIMIT 1",
                    [conversation_id, user_id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?;
            Ok(row.is_some())
        })
    }
}

fn map_conversation_row(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<ConversationRow, rusqlite::Error> {
    Ok(ConversationRow {
        id: row.get(0)?,
        is_group: row.get(1)?,
        name: row.get(2)?,
        image_ref: row.get(3)?,
        canonical_key: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_direct_by_key(conn: &Connection, key: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, is_group, name, image_ref, canonical_key, created_at
         FROM conversations WHERE canonical_key = ?1 AND is_group = 0",
    )?;
    let row = stmt.query_row([key], map_conversation_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::keys::{canonical_key, participant_set};
    use uuid::Uuid;

    fn seed_user(db: &Database, name: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.resolve_user(&id, &format!("ext-{}", id), name, "", None)
            .unwrap()
            .id
    }

    #[test]
    fn direct_conversation_deduplicates_across_initiators() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "Alice");
        let bob = seed_user(&db, "Bob");

        let a: Uuid = alice.parse().unwrap();
        let b: Uuid = bob.parse().unwrap();

        // Alice initiates, then Bob initiates independently; the
        // canonical key is identical either way.
        let key_ab = canonical_key(&participant_set(a, &[b]));
        let key_ba = canonical_key(&participant_set(b, &[a]));
        assert_eq!(key_ab, key_ba);

        let first = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some(&key_ab),
                &[alice.clone(), bob.clone()],
            )
            .unwrap();

        let existing = db.find_direct_conversation(&key_ba).unwrap().unwrap();
        assert_eq!(existing.id, first);
    }

    #[test]
    fn lost_canonical_key_race_converges_on_winner() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "Alice");
        let bob = seed_user(&db, "Bob");
        let key = canonical_key(&[alice.parse().unwrap(), bob.parse().unwrap()]);

        // Both callers missed the lookup and insert; the second hits
        // the unique index and must return the first id.
        let winner = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some(&key),
                &[alice.clone(), bob.clone()],
            )
            .unwrap();
        let loser = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some(&key),
                &[alice, bob],
            )
            .unwrap();

        assert_eq!(winner, loser);
    }

    #[test]
    fn group_conversations_never_deduplicate() {
        let db = Database::open_in_memory().unwrap();
        let members: Vec<String> = (0..3).map(|i| seed_user(&db, &format!("u{}", i))).collect();

        let first = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                true,
                Some("book club"),
                None,
                None,
                &members,
            )
            .unwrap();
        let second = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                true,
                Some("book club"),
                None,
                None,
                &members,
            )
            .unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn membership_checks() {
        let db = Database::open_in_memory().unwrap();
        let alice = seed_user(&db, "Alice");
        let bob = seed_user(&db, "Bob");
        let carol = seed_user(&db, "Carol");

        let cid = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some("k"),
                &[alice.clone(), bob.clone()],
            )
            .unwrap();

        assert!(db.is_participant(&cid, &alice).unwrap());
        assert!(db.is_participant(&cid, &bob).unwrap());
        assert!(!db.is_participant(&cid, &carol).unwrap());
        assert_eq!(db.participants_of(&cid).unwrap().len(), 2);
    }
}
