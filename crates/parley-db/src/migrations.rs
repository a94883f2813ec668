use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// All timestamps are integer milliseconds since the Unix epoch.
/// `conversations.last_message_id` is a weak pointer (no FK) so the delete
/// cascade can remove messages without tripping referential checks.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            handle          TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            display_name    TEXT,
            avatar_url      TEXT,
            created_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY,
            participant_one TEXT NOT NULL REFERENCES users(id),
            participant_two TEXT NOT NULL REFERENCES users(id),
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            last_message_id TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_participant_one
            ON conversations(participant_one);
        CREATE INDEX IF NOT EXISTS idx_conversations_participant_two
            ON conversations(participant_two);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            kind            TEXT NOT NULL DEFAULT 'text'
                CHECK (kind IN ('text', 'image', 'audio', 'video', 'file')),
            media_url       TEXT,
            reply_to        TEXT,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL,
            is_edited       INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id);

        -- Declared extension point: one message may own several media rows.
        -- Nothing reads or writes this table yet.
        CREATE TABLE IF NOT EXISTS media (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            url         TEXT NOT NULL,
            kind        TEXT NOT NULL
                CHECK (kind IN ('image', 'audio', 'video', 'file')),
            size        INTEGER NOT NULL,
            mime_type   TEXT NOT NULL,
            duration    INTEGER,
            file_name   TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_media_message
            ON media(message_id);

        -- Upload-bridge blobs; the bytes themselves live under ./uploads/{id}
        CREATE TABLE IF NOT EXISTS files (
            id          TEXT PRIMARY KEY,
            owner_id    TEXT NOT NULL REFERENCES users(id),
            size        INTEGER NOT NULL,
            created_at  INTEGER NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
