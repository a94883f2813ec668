use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use parley_types::models::MessageKind;

use crate::Database;
use crate::error::StoreError;
use crate::models::{
    ConversationHandle, ConversationListRow, ConversationRow, DeletedConversation, FileRow,
    MessageRow, SentMessage, UserRow,
};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        handle: &str,
        email: &str,
        password_hash: &str,
        display_name: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, handle, email, password, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, handle, email, password_hash, display_name, now_ms()],
            )?;
            Ok(())
        })
    }

    /// Directory lookup: external identity string -> user record.
    /// Pure read; callers turn `None` into `NotFound` as their operation
    /// requires.
    pub fn find_user_by_handle(&self, handle: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user_by_handle(conn, handle))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, handle, email, password, display_name, avatar_url, created_at
                     FROM users WHERE id = ?1",
                )?
                .query_row([id], map_user_row)
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .prepare(
                    "SELECT id, handle, email, password, display_name, avatar_url, created_at
                     FROM users WHERE email = ?1",
                )?
                .query_row([email], map_user_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Patch semantics: absent fields keep their current value.
    pub fn update_profile(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<UserRow, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET display_name = COALESCE(?2, display_name),
                     avatar_url = COALESCE(?3, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![user_id, display_name, avatar_url],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("user"));
            }
            conn.prepare(
                "SELECT id, handle, email, password, display_name, avatar_url, created_at
                 FROM users WHERE id = ?1",
            )?
            .query_row([user_id], map_user_row)
            .map_err(StoreError::from)
        })
    }

    // -- Conversations --

    /// Find the conversation between two users, creating it if absent.
    /// Idempotent and insensitive to participant order: the existing-row
    /// lookup checks both orderings.
    pub fn create_or_get_conversation(
        &self,
        current_handle: &str,
        participant_handle: &str,
    ) -> Result<ConversationHandle, StoreError> {
        self.with_conn(|conn| {
            let current =
                query_user_by_handle(conn, current_handle)?.ok_or(StoreError::NotFound("user"))?;
            let other = query_user_by_handle(conn, participant_handle)?
                .ok_or(StoreError::NotFound("user"))?;

            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM conversations
                     WHERE (participant_one = ?1 AND participant_two = ?2)
                        OR (participant_one = ?2 AND participant_two = ?1)",
                    rusqlite::params![current.id, other.id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(id) = existing {
                return Ok(ConversationHandle {
                    id,
                    participant_one: current.id,
                    participant_two: other.id,
                    created: false,
                });
            }

            let id = Uuid::new_v4().to_string();
            let now = now_ms();
            conn.execute(
                "INSERT INTO conversations (id, participant_one, participant_two, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, current.id, other.id, now],
            )?;

            Ok(ConversationHandle {
                id,
                participant_one: current.id,
                participant_two: other.id,
                created: true,
            })
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>, StoreError> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Every conversation where the user is either participant, most recently
    /// updated first. The other participant's display data and the last
    /// message are joined in a single query (eliminates N+1).
    pub fn conversations_for_user(
        &self,
        handle: &str,
    ) -> Result<Vec<ConversationListRow>, StoreError> {
        self.with_conn(|conn| {
            let user =
                query_user_by_handle(conn, handle)?.ok_or(StoreError::NotFound("user"))?;

            let mut stmt = conn.prepare(
                "SELECT c.id, c.updated_at,
                        CASE WHEN c.participant_one = ?1
                             THEN COALESCE(u2.display_name, u2.handle)
                             ELSE COALESCE(u1.display_name, u1.handle) END,
                        CASE WHEN c.participant_one = ?1
                             THEN u2.avatar_url ELSE u1.avatar_url END,
                        m.content, m.kind
                 FROM conversations c
                 JOIN users u1 ON u1.id = c.participant_one
                 JOIN users u2 ON u2.id = c.participant_two
                 LEFT JOIN messages m ON m.id = c.last_message_id
                 WHERE c.participant_one = ?1 OR c.participant_two = ?1
                 ORDER BY c.updated_at DESC",
            )?;

            let rows = stmt
                .query_map([&user.id], |row| {
                    Ok(ConversationListRow {
                        id: row.get(0)?,
                        updated_at: row.get(1)?,
                        other_name: row.get(2)?,
                        other_avatar: row.get(3)?,
                        last_message: row.get(4)?,
                        last_kind: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Delete a conversation and every message in it. The caller must be a
    /// participant. The whole cascade runs in one transaction, so a failure
    /// partway through leaves nothing half-deleted.
    pub fn delete_conversation(
        &self,
        handle: &str,
        conversation_id: &str,
    ) -> Result<DeletedConversation, StoreError> {
        self.with_conn(|conn| {
            let user =
                query_user_by_handle(conn, handle)?.ok_or(StoreError::NotFound("user"))?;
            let conversation = query_conversation(conn, conversation_id)?
                .ok_or(StoreError::NotFound("conversation"))?;

            if conversation.participant_one != user.id && conversation.participant_two != user.id {
                return Err(StoreError::Forbidden);
            }

            let tx = conn.unchecked_transaction()?;
            let deleted_messages = tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                [conversation_id],
            )?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
            tx.commit()?;

            Ok(DeletedConversation {
                participant_one: conversation.participant_one,
                participant_two: conversation.participant_two,
                deleted_messages,
            })
        })
    }

    // -- Messages --

    /// Append a message and patch the parent conversation's last-message
    /// pointer and update timestamp, atomically.
    pub fn send_message(
        &self,
        conversation_id: &str,
        sender_handle: &str,
        content: &str,
        kind: MessageKind,
        media_url: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<SentMessage, StoreError> {
        if kind == MessageKind::Text && content.trim().is_empty() {
            return Err(StoreError::Invalid("content must not be empty"));
        }

        self.with_conn(|conn| {
            let sender =
                query_user_by_handle(conn, sender_handle)?.ok_or(StoreError::NotFound("user"))?;
            let conversation = query_conversation(conn, conversation_id)?
                .ok_or(StoreError::NotFound("conversation"))?;

            let message_id = Uuid::new_v4().to_string();
            let now = now_ms();

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages
                     (id, conversation_id, sender_id, content, kind, media_url, reply_to,
                      created_at, updated_at, is_edited)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 0)",
                rusqlite::params![
                    message_id,
                    conversation_id,
                    sender.id,
                    content,
                    kind.as_str(),
                    media_url,
                    reply_to,
                    now
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_id = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![conversation_id, message_id, now],
            )?;
            tx.commit()?;

            Ok(SentMessage {
                message_id,
                conversation_id: conversation_id.to_string(),
                sender_id: sender.id,
                sender_name: sender.display_name.unwrap_or(sender.handle),
                participant_one: conversation.participant_one,
                participant_two: conversation.participant_two,
                created_at: now,
            })
        })
    }

    /// Up to `limit` messages, oldest first. There is no cursor: callers
    /// wanting the most recent messages of a long history must pass a large
    /// enough limit.
    pub fn messages_for_conversation(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, u.handle, COALESCE(u.display_name, u.handle),
                        m.content, m.kind, m.media_url, m.created_at
                 FROM messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at ASC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_handle: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        sender_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        content: row.get(3)?,
                        kind: row.get(4)?,
                        media_url: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Files --

    pub fn insert_file(&self, id: &str, owner_id: &str, size: i64) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, owner_id, size, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, owner_id, size, now_ms()],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .prepare("SELECT id, owner_id, size, created_at FROM files WHERE id = ?1")?
                .query_row([id], |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        size: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        handle: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        display_name: row.get(4)?,
        avatar_url: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn query_user_by_handle(conn: &Connection, handle: &str) -> Result<Option<UserRow>, StoreError> {
    let row = conn
        .prepare(
            "SELECT id, handle, email, password, display_name, avatar_url, created_at
             FROM users WHERE handle = ?1",
        )?
        .query_row([handle], map_user_row)
        .optional()?;
    Ok(row)
}

fn query_conversation(
    conn: &Connection,
    id: &str,
) -> Result<Option<ConversationRow>, StoreError> {
    let row = conn
        .prepare(
            "SELECT id, participant_one, participant_two, created_at, updated_at, last_message_id
             FROM conversations WHERE id = ?1",
        )?
        .query_row([id], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                participant_one: row.get(1)?,
                participant_two: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
                last_message_id: row.get(5)?,
            })
        })
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn test_db() -> Database {
        Database::open(Path::new(":memory:")).unwrap()
    }

    fn add_user(db: &Database, handle: &str, display_name: Option<&str>) -> String {
        let id = Uuid::new_v4().to_string();
        let email = format!("{handle}@example.com");
        db.create_user(&id, handle, &email, "argon2-hash", display_name)
            .unwrap();
        id
    }

    #[test]
    fn create_or_get_is_idempotent_and_order_insensitive() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);

        let first = db.create_or_get_conversation("u1", "u2").unwrap();
        assert!(first.created);

        let again = db.create_or_get_conversation("u1", "u2").unwrap();
        assert!(!again.created);
        assert_eq!(first.id, again.id);

        let swapped = db.create_or_get_conversation("u2", "u1").unwrap();
        assert!(!swapped.created);
        assert_eq!(first.id, swapped.id);
    }

    #[test]
    fn create_or_get_unknown_user_is_not_found() {
        let db = test_db();
        add_user(&db, "u1", None);

        let err = db.create_or_get_conversation("u1", "ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = db.create_or_get_conversation("ghost", "u1").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn messages_come_back_oldest_first() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);
        let conv = db.create_or_get_conversation("u1", "u2").unwrap();

        for i in 0..5 {
            let content = format!("message {i}");
            db.send_message(&conv.id, "u1", &content, MessageKind::Text, None, None)
                .unwrap();
        }

        let messages = db.messages_for_conversation(&conv.id, 50).unwrap();
        assert_eq!(messages.len(), 5);
        for (i, msg) in messages.iter().enumerate() {
            assert_eq!(msg.content, format!("message {i}"));
        }
        for pair in messages.windows(2) {
            assert!(pair[0].created_at <= pair[1].created_at);
        }
    }

    #[test]
    fn limit_bounds_the_page() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);
        let conv = db.create_or_get_conversation("u1", "u2").unwrap();

        for i in 0..4 {
            let content = format!("m{i}");
            db.send_message(&conv.id, "u1", &content, MessageKind::Text, None, None)
                .unwrap();
        }

        let page = db.messages_for_conversation(&conv.id, 2).unwrap();
        assert_eq!(page.len(), 2);
        // oldest first: the limit keeps the head of the history
        assert_eq!(page[0].content, "m0");
        assert_eq!(page[1].content, "m1");
    }

    #[test]
    fn send_patches_last_message_and_timestamp() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);
        let conv = db.create_or_get_conversation("u1", "u2").unwrap();

        let before = db.get_conversation(&conv.id).unwrap().unwrap();
        assert!(before.last_message_id.is_none());

        let first = db
            .send_message(&conv.id, "u1", "hello", MessageKind::Text, None, None)
            .unwrap();
        let after_first = db.get_conversation(&conv.id).unwrap().unwrap();
        assert_eq!(after_first.last_message_id.as_deref(), Some(first.message_id.as_str()));
        assert!(after_first.updated_at >= before.updated_at);

        let second = db
            .send_message(&conv.id, "u2", "hi back", MessageKind::Text, None, None)
            .unwrap();
        let after_second = db.get_conversation(&conv.id).unwrap().unwrap();
        assert_eq!(
            after_second.last_message_id.as_deref(),
            Some(second.message_id.as_str())
        );
        assert!(after_second.updated_at >= after_first.updated_at);
    }

    #[test]
    fn send_rejects_blank_text() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);
        let conv = db.create_or_get_conversation("u1", "u2").unwrap();

        let err = db
            .send_message(&conv.id, "u1", "   ", MessageKind::Text, None, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        // Media messages may carry an empty caption
        db.send_message(
            &conv.id,
            "u1",
            "",
            MessageKind::Image,
            Some("/files/abc"),
            None,
        )
        .unwrap();
    }

    #[test]
    fn send_to_missing_conversation_is_not_found() {
        let db = test_db();
        add_user(&db, "u1", None);

        let err = db
            .send_message(
                &Uuid::new_v4().to_string(),
                "u1",
                "hello",
                MessageKind::Text,
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("conversation")));
    }

    #[test]
    fn delete_by_non_participant_is_forbidden_and_changes_nothing() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);
        add_user(&db, "intruder", None);
        let conv = db.create_or_get_conversation("u1", "u2").unwrap();
        db.send_message(&conv.id, "u1", "hello", MessageKind::Text, None, None)
            .unwrap();

        let err = db.delete_conversation("intruder", &conv.id).unwrap_err();
        assert!(matches!(err, StoreError::Forbidden));

        assert!(db.get_conversation(&conv.id).unwrap().is_some());
        assert_eq!(db.messages_for_conversation(&conv.id, 50).unwrap().len(), 1);
    }

    #[test]
    fn delete_cascades_to_all_messages() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", None);
        let conv = db.create_or_get_conversation("u1", "u2").unwrap();

        for i in 0..3 {
            let content = format!("m{i}");
            db.send_message(&conv.id, "u2", &content, MessageKind::Text, None, None)
                .unwrap();
        }

        let outcome = db.delete_conversation("u2", &conv.id).unwrap();
        assert_eq!(outcome.deleted_messages, 3);

        assert!(db.get_conversation(&conv.id).unwrap().is_none());
        assert!(db.messages_for_conversation(&conv.id, 50).unwrap().is_empty());
    }

    #[test]
    fn listing_is_denormalized_and_recency_ordered() {
        let db = test_db();
        add_user(&db, "u1", None);
        add_user(&db, "u2", Some("Beatrice"));
        add_user(&db, "u3", None);

        let with_u2 = db.create_or_get_conversation("u1", "u2").unwrap();
        let with_u3 = db.create_or_get_conversation("u1", "u3").unwrap();

        db.send_message(&with_u3.id, "u3", "older", MessageKind::Text, None, None)
            .unwrap();
        // millisecond timestamps: space the sends out so recency is unambiguous
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.send_message(&with_u2.id, "u2", "newer", MessageKind::Text, None, None)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        db.send_message(&with_u2.id, "u1", "newest", MessageKind::Text, None, None)
            .unwrap();

        let rows = db.conversations_for_user("u1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, with_u2.id);
        assert_eq!(rows[0].other_name, "Beatrice");
        assert_eq!(rows[0].last_message.as_deref(), Some("newest"));
        assert_eq!(rows[1].id, with_u3.id);
        // display_name absent: handle stands in
        assert_eq!(rows[1].other_name, "u3");
        assert!(rows[0].updated_at >= rows[1].updated_at);
    }

    #[test]
    fn listing_for_unknown_user_is_not_found() {
        let db = test_db();
        let err = db.conversations_for_user("ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound("user")));
    }

    // Two fresh users, either ordering, one text message, denormalized
    // read back.
    #[test]
    fn two_user_scenario() {
        let db = test_db();
        add_user(&db, "u1", Some("Alice"));
        add_user(&db, "u2", Some("Bob"));

        let a = db.create_or_get_conversation("u1", "u2").unwrap();
        let b = db.create_or_get_conversation("u2", "u1").unwrap();
        assert_eq!(a.id, b.id);

        db.send_message(&a.id, "u1", "hello", MessageKind::Text, None, None)
            .unwrap();

        let messages = db.messages_for_conversation(&a.id, 50).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[0].sender_handle, "u1");
        assert_eq!(messages[0].sender_name, "Alice");
        assert_eq!(messages[0].kind, "text");
    }

    #[test]
    fn profile_update_patches_only_provided_fields() {
        let db = test_db();
        let id = add_user(&db, "u1", Some("Alice"));

        let updated = db.update_profile(&id, None, Some("/files/avatar")).unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Alice"));
        assert_eq!(updated.avatar_url.as_deref(), Some("/files/avatar"));

        let renamed = db.update_profile(&id, Some("Alicia"), None).unwrap();
        assert_eq!(renamed.display_name.as_deref(), Some("Alicia"));
        assert_eq!(renamed.avatar_url.as_deref(), Some("/files/avatar"));
    }
}
