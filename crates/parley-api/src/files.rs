use axum::{
    Extension,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::error;
use uuid::Uuid;

use parley_types::api::{Claims, UploadResponse};

use crate::auth::AppState;
use crate::store_status;

/// 50 MB upload limit for files
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// POST /files — accepts raw bytes (application/octet-stream), saves to
/// ./uploads/{id}, inserts DB row, returns { file_id, size, url }. The url is
/// what clients put in a message's `media_url`.
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if bytes.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    if bytes.len() > MAX_FILE_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    let file_id = Uuid::new_v4();
    let size = bytes.len() as i64;

    // Ensure uploads directory exists
    tokio::fs::create_dir_all("./uploads")
        .await
        .map_err(|e| {
            error!("Failed to create uploads directory: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    // Write blob to disk
    let file_path = format!("./uploads/{}", file_id);
    let mut file = tokio::fs::File::create(&file_path).await.map_err(|e| {
        error!("Failed to create file {}: {}", file_path, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", file_path, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // Insert DB record
    let db = state.db.clone();
    let fid = file_id.to_string();
    let uid = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.insert_file(&fid, &uid, size))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(store_status)?;

    Ok((
        StatusCode::CREATED,
        axum::Json(UploadResponse {
            file_id,
            size: size as u64,
            url: format!("/files/{}", file_id),
        }),
    ))
}

/// GET /files/{file_id} — reads the blob back from disk.
pub async fn download_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    // Validate file_id is a valid UUID to prevent path traversal
    file_id
        .parse::<Uuid>()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    // Verify file exists in DB
    let db = state.db.clone();
    let fid = file_id.clone();
    let file_row = tokio::task::spawn_blocking(move || db.get_file(&fid))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(store_status)?;

    if file_row.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }

    // Read from disk
    let file_path = format!("./uploads/{}", file_id);
    let bytes = tokio::fs::read(&file_path).await.map_err(|e| {
        error!("Failed to read file {}: {}", file_path, e);
        StatusCode::NOT_FOUND
    })?;

    Ok((
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}
