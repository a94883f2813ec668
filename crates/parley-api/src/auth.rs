use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use parley_db::Database;
use parley_gateway::Dispatcher;
use parley_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::store_status;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate input
    if req.handle.len() < 3 || req.handle.len() > 32 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !req.handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !req.email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Check if handle or email is taken
    let db = state.db.clone();
    let handle = req.handle.clone();
    let check_handle = req.handle.clone();
    let check_email = req.email.clone();
    let taken = tokio::task::spawn_blocking(move || {
        Ok::<_, parley_db::StoreError>(
            db.find_user_by_handle(&check_handle)?.is_some()
                || db.get_user_by_email(&check_email)?.is_some(),
        )
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(store_status)?;

    if taken {
        return Err(StatusCode::CONFLICT);
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .to_string();

    let user_id = Uuid::new_v4();

    let db = state.db.clone();
    let uid = user_id.to_string();
    tokio::task::spawn_blocking(move || {
        db.create_user(
            &uid,
            &req.handle,
            &req.email,
            &password_hash,
            req.display_name.as_deref(),
        )
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(store_status)?;

    let token = create_token(&state.jwt_secret, user_id, &handle)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let handle = req.handle.clone();
    let user = tokio::task::spawn_blocking(move || db.find_user_by_handle(&handle))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(store_status)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Verify password
    let parsed_hash =
        PasswordHash::new(&user.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = create_token(&state.jwt_secret, user_id, &user.handle)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        user_id,
        handle: user.handle,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, handle: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        handle: handle.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
