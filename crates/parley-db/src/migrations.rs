use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            external_id         TEXT NOT NULL UNIQUE,
            name                TEXT NOT NULL,
            email               TEXT NOT NULL DEFAULT '',
            avatar_ref          TEXT,
            preferred_language  TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            is_group        INTEGER NOT NULL DEFAULT 0,
            name            TEXT,
            image_ref       TEXT,
            canonical_key   TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- De-duplication guarantee for two-party conversations: at most
        -- one non-group conversation per canonical participant key.
        -- Concurrent first-contact inserts collide here and the loser
        -- re-reads the winner's row.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_conversations_canonical
            ON conversations(canonical_key) WHERE is_group = 0;

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS message_media (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            position    INTEGER NOT NULL,
            storage_ref TEXT NOT NULL,
            kind        TEXT NOT NULL,
            file_name   TEXT,
            file_size   INTEGER,
            mime_type   TEXT,
            duration_ms INTEGER,
            width       INTEGER,
            height      INTEGER,
            PRIMARY KEY (message_id, position)
        );

        -- One marker per (message, recipient); created at send time for
        -- every participant except the sender, flipped 0 -> 1 by the
        -- recipient, never back.
        CREATE TABLE IF NOT EXISTS read_markers (
            message_id      TEXT NOT NULL REFERENCES messages(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            is_read         INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_read_markers_user
            ON read_markers(user_id, conversation_id, is_read);

        -- Write-once translation memo; messages are immutable so rows
        -- are never updated or invalidated.
        CREATE TABLE IF NOT EXISTS translations (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            language    TEXT NOT NULL,
            text        TEXT NOT NULL,
            PRIMARY KEY (message_id, language)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
