use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_types::api::{Claims, MessageView, SendMessageRequest, SendMessageResponse};
use parley_types::events::GatewayEvent;
use parley_types::models::MessageKind;

use crate::auth::AppState;
use crate::{store_status, timefmt};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// POST /conversations/{id}/messages — append a message and push it to both
/// participants over the gateway.
pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Run blocking DB insert off the async runtime
    let db = state.db.clone();
    let cid = conversation_id.to_string();
    let handle = claims.handle.clone();
    let content = req.content.clone();
    let media_url = req.media_url.clone();
    let reply_to = req.reply_to.map(|id| id.to_string());
    let sent = tokio::task::spawn_blocking(move || {
        db.send_message(
            &cid,
            &handle,
            &content,
            req.kind,
            media_url.as_deref(),
            reply_to.as_deref(),
        )
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(store_status)?;

    let message_id: Uuid = sent.message_id.parse().unwrap_or_else(|e| {
        warn!("Corrupt message id '{}': {}", sent.message_id, e);
        Uuid::default()
    });

    let event = GatewayEvent::MessageCreate {
        id: message_id,
        conversation_id,
        sender_id: claims.sub,
        sender_handle: claims.handle.clone(),
        sender_name: sent.sender_name,
        content: req.content,
        kind: req.kind,
        media_url: req.media_url,
        timestamp: timefmt::millis_to_utc(sent.created_at),
    };

    // Targeted push: only the two participants hear about it.
    for participant in [&sent.participant_one, &sent.participant_two] {
        if let Ok(uid) = participant.parse::<Uuid>() {
            state.dispatcher.send_to_user(uid, event.clone()).await;
        }
    }

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message_id })))
}

/// GET /conversations/{id}/messages — up to `limit` messages, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let cid = conversation_id.to_string();
    let limit = query.limit.min(200);

    let rows = tokio::task::spawn_blocking(move || db.messages_for_conversation(&cid, limit))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(store_status)?;

    let now = chrono::Utc::now();

    let messages: Vec<MessageView> = rows
        .into_iter()
        .map(|row| MessageView {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt message id '{}': {}", row.id, e);
                Uuid::default()
            }),
            sender_handle: row.sender_handle,
            sender: row.sender_name,
            content: row.content,
            time: timefmt::format_chat_time(timefmt::millis_to_utc(row.created_at), now),
            is_sent: true,
            kind: MessageKind::parse(&row.kind),
            media_url: row.media_url,
        })
        .collect();

    Ok(Json(messages))
}
