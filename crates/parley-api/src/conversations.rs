use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use parley_types::api::{
    Claims, ConversationView, CreateConversationRequest, CreateConversationResponse,
    DeleteConversationResponse,
};
use parley_types::events::GatewayEvent;
use parley_types::models::MessageKind;

use crate::auth::AppState;
use crate::{store_status, timefmt};

/// POST /conversations — find or create the conversation between the caller
/// and another user. Idempotent: posting twice (or from the other side)
/// returns the same conversation. 201 only when a row was actually written.
pub async fn create_or_get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let handle = claims.handle.clone();
    let other = req.participant_handle.clone();
    let outcome =
        tokio::task::spawn_blocking(move || db.create_or_get_conversation(&handle, &other))
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .map_err(store_status)?;

    let conversation_id: Uuid = outcome.id.parse().unwrap_or_else(|e| {
        warn!("Corrupt conversation id '{}': {}", outcome.id, e);
        Uuid::default()
    });

    // Both participants re-run their sidebar query on this event.
    if outcome.created {
        for participant in [&outcome.participant_one, &outcome.participant_two] {
            if let Ok(uid) = participant.parse::<Uuid>() {
                state
                    .dispatcher
                    .send_to_user(uid, GatewayEvent::ConversationCreate { id: conversation_id })
                    .await;
            }
        }
    }

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(CreateConversationResponse { conversation_id })))
}

/// GET /conversations — the caller's sidebar, most recently updated first.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let handle = claims.handle.clone();
    let rows = tokio::task::spawn_blocking(move || db.conversations_for_user(&handle))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(store_status)?;

    let now = chrono::Utc::now();

    let conversations: Vec<ConversationView> = rows
        .into_iter()
        .map(|row| ConversationView {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt conversation id '{}': {}", row.id, e);
                Uuid::default()
            }),
            name: row.other_name,
            chat_image: row.other_avatar.unwrap_or_default(),
            last_message: row.last_message.unwrap_or_default(),
            time: timefmt::format_chat_time(timefmt::millis_to_utc(row.updated_at), now),
            unread: 0,
            kind: row
                .last_kind
                .as_deref()
                .map(MessageKind::parse)
                .unwrap_or_default(),
        })
        .collect();

    Ok(Json(conversations))
}

/// DELETE /conversations/{id} — remove the conversation and every message in
/// it. Participants only.
pub async fn delete(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let handle = claims.handle.clone();
    let cid = conversation_id.to_string();
    let outcome = tokio::task::spawn_blocking(move || db.delete_conversation(&handle, &cid))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(store_status)?;

    for participant in [&outcome.participant_one, &outcome.participant_two] {
        if let Ok(uid) = participant.parse::<Uuid>() {
            state
                .dispatcher
                .send_to_user(
                    uid,
                    GatewayEvent::ConversationDelete {
                        id: conversation_id,
                        deleted_messages: outcome.deleted_messages,
                    },
                )
                .await;
        }
    }

    Ok(Json(DeleteConversationResponse {
        success: true,
        deleted_messages: outcome.deleted_messages,
    }))
}
