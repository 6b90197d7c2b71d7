use crate::{Database, OptionalExt};
use anyhow::Result;

impl Database {
    pub fn get_translation(&self, message_id: &str, language: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT text FROM translations WHERE message_id = ?1 AND language = ?2",
                    [message_id, language],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Write-once memo: a concurrent duplicate write is ignored, the
    /// first stored text stays.
    pub fn store_translation(&self, message_id: &str, language: &str, text: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO translations (message_id, language, text)
                 VALUES (?1, ?2, ?3)",
                [message_id, language, text],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use uuid::Uuid;

    #[test]
    fn first_write_wins() {
        let db = Database::open_in_memory().unwrap();
        let sender = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-s", "s", "", None)
            .unwrap()
            .id;
        let other = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-o", "o", "", None)
            .unwrap()
            .id;
        let cid = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some("key"),
                &[sender.clone(), other],
            )
            .unwrap();
        let mid = Uuid::new_v4().to_string();
        db.insert_message(&mid, &cid, &sender, "hola", &[]).unwrap();

        assert_eq!(db.get_translation(&mid, "en").unwrap(), None);

        db.store_translation(&mid, "en", "hello").unwrap();
        db.store_translation(&mid, "en", "hi there").unwrap();

        assert_eq!(
            db.get_translation(&mid, "en").unwrap().as_deref(),
            Some("hello")
        );
    }
}
