pub mod auth;
pub mod conversations;
pub mod files;
pub mod messages;
pub mod middleware;
pub mod timefmt;
pub mod users;

use axum::http::StatusCode;
use tracing::error;

use parley_db::StoreError;

/// Map store failures onto HTTP status codes. Anything outside the named
/// taxonomy is logged and surfaced as a 500.
pub(crate) fn store_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Forbidden => StatusCode::FORBIDDEN,
        StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
        other => {
            error!("store error: {}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
