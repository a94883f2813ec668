/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub handle: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: i64,
}

pub struct ConversationRow {
    pub id: String,
    pub participant_one: String,
    pub participant_two: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_message_id: Option<String>,
}

/// One denormalized sidebar row: the other participant's display data and
/// the last message, joined in a single query.
#[derive(Debug)]
pub struct ConversationListRow {
    pub id: String,
    pub updated_at: i64,
    pub other_name: String,
    pub other_avatar: Option<String>,
    pub last_message: Option<String>,
    pub last_kind: Option<String>,
}

pub struct MessageRow {
    pub id: String,
    pub sender_handle: String,
    pub sender_name: String,
    pub content: String,
    pub kind: String,
    pub media_url: Option<String>,
    pub created_at: i64,
}

/// Outcome of create-or-get: the conversation id plus whether a new row was
/// written, and both participants so the API layer can target push events.
#[derive(Debug)]
pub struct ConversationHandle {
    pub id: String,
    pub participant_one: String,
    pub participant_two: String,
    pub created: bool,
}

/// Outcome of a message append.
#[derive(Debug)]
pub struct SentMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub participant_one: String,
    pub participant_two: String,
    pub created_at: i64,
}

/// Outcome of a conversation delete cascade.
#[derive(Debug)]
pub struct DeletedConversation {
    pub participant_one: String,
    pub participant_two: String,
    pub deleted_messages: usize,
}

pub struct FileRow {
    pub id: String,
    pub owner_id: String,
    pub size: i64,
    pub created_at: i64,
}
