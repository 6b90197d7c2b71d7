use crate::models::UserRow;
use crate::{Database, OptionalExt};
use anyhow::{Result, anyhow};
use rusqlite::Connection;

impl Database {
    /// Lookup-or-create by the auth provider's opaque identity.
    /// `candidate_id` is used only when the row does not exist yet; a
    /// concurrent insert for the same external id loses on the UNIQUE
    /// constraint and the existing row is returned.
    pub fn resolve_user(
        &self,
        candidate_id: &str,
        external_id: &str,
        name: &str,
        email: &str,
        avatar_ref: Option<&str>,
    ) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (id, external_id, name, email, avatar_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![candidate_id, external_id, name, email, avatar_ref],
            )?;
            query_user_by_external_id(conn, external_id)?
                .ok_or_else(|| anyhow!("User vanished after upsert: {}", external_id))
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Batch-fetch user rows for a set of ids.
    pub fn get_users(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, external_id, name, email, avatar_ref, preferred_language, created_at
                 FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn set_preferred_language(&self, user_id: &str, language: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET preferred_language = ?2 WHERE id = ?1",
                rusqlite::params![user_id, language],
            )?;
            if changed == 0 {
                return Err(anyhow!("User not found: {}", user_id));
            }
            Ok(())
        })
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        avatar_ref: row.get(4)?,
        preferred_language: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, external_id, name, email, avatar_ref, preferred_language, created_at
         FROM users WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], map_user_row).optional()?;
    Ok(row)
}

fn query_user_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, external_id, name, email, avatar_ref, preferred_language, created_at
         FROM users WHERE external_id = ?1",
    )?;
    let row = stmt.query_row([external_id], map_user_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use uuid::Uuid;

    #[test]
    fn resolve_user_is_idempotent_per_external_id() {
        let db = Database::open_in_memory().unwrap();

        let first = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-1", "Ada", "ada@example.com", None)
            .unwrap();
        let second = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-1", "Ada", "ada@example.com", None)
            .unwrap();

        assert_eq!(first.id, second.id);
    }

    #[test]
    fn preferred_language_updates() {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-2", "Bo", "", None)
            .unwrap();

        db.set_preferred_language(&user.id, Some("es")).unwrap();
        let row = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(row.preferred_language.as_deref(), Some("es"));

        db.set_preferred_language(&user.id, None).unwrap();
        let row = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(row.preferred_language, None);
    }
}
