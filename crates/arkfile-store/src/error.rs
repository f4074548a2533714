use thiserror::Error;

/// Errors surfaced by the Auth State Store.
///
/// Callers may retry `StoreError::Backend` at most once for idempotent
/// reads; writes are never retried automatically since a transient failure
/// after a partial write is indistinguishable from a committed one without
/// re-reading state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identifier already exists")]
    AlreadyExists,

    #[error("no such record")]
    NotFound,

    #[error("usage log conflict: code already recorded for this window")]
    ReplayConflict,

    #[error("store call exceeded its deadline")]
    Timeout,

    #[error("backing store error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}
