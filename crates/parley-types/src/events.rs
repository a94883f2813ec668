use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageKind;

/// Events sent over the WebSocket gateway.
///
/// Message and conversation events are delivered only to the two participants
/// of the conversation; presence is broadcast to everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, handle: String },

    /// A new message was posted in one of the recipient's conversations
    MessageCreate {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        sender_handle: String,
        sender_name: String,
        content: String,
        kind: MessageKind,
        media_url: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A conversation involving the recipient was created.
    /// Clients re-run their conversation query on receipt.
    ConversationCreate { id: Uuid },

    /// A conversation involving the recipient was deleted, along with all
    /// of its messages.
    ConversationDelete { id: Uuid, deleted_messages: usize },

    /// The other participant started typing
    TypingStart {
        conversation_id: Uuid,
        user_id: Uuid,
        handle: String,
    },

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        handle: String,
        online: bool,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Indicate typing in a conversation
    StartTyping { conversation_id: Uuid },
}
