use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use parley_db::models::UserRow;
use parley_types::api::{Claims, ProfileResponse, UpdateProfileRequest, UserSummary};

use crate::auth::AppState;
use crate::{store_status, timefmt};

/// GET /users/me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || db.get_user_by_id(&uid))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(store_status)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(profile_of(user)))
}

/// PATCH /users/me — absent fields keep their current value.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();
    let user = tokio::task::spawn_blocking(move || {
        db.update_profile(&uid, req.display_name.as_deref(), req.avatar_url.as_deref())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(store_status)?;

    Ok(Json(profile_of(user)))
}

/// GET /users/{handle} — directory lookup for starting a conversation.
pub async fn get_by_handle(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || db.find_user_by_handle(&handle))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(store_status)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(UserSummary {
        id: parse_user_id(&user.id),
        handle: user.handle,
        display_name: user.display_name,
        avatar_url: user.avatar_url,
    }))
}

fn profile_of(user: UserRow) -> ProfileResponse {
    ProfileResponse {
        id: parse_user_id(&user.id),
        handle: user.handle,
        email: user.email,
        display_name: user.display_name,
        avatar_url: user.avatar_url,
        created_at: timefmt::millis_to_utc(user.created_at),
    }
}

fn parse_user_id(id: &str) -> Uuid {
    id.parse().unwrap_or_else(|e| {
        warn!("Corrupt user id '{}': {}", id, e);
        Uuid::default()
    })
}
