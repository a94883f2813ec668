use thiserror::Error;

/// Store-level failure taxonomy. Handlers map these onto HTTP status codes;
/// anything not listed here surfaces as `Db` and becomes a 500.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("user is not a participant of the conversation")]
    Forbidden,

    #[error("invalid argument: {0}")]
    Invalid(&'static str),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}
