use thiserror::Error;

/// Errors surfaced by the Token Service, including the middleware validation
/// boundary's four distinguished failure codes (§4.D).
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no bearer token present")]
    MissingToken,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("refresh token not found or already consumed")]
    NotFound,

    #[error("signing key material could not be loaded: {0}")]
    KeyLoad(String),

    #[error("store error: {0}")]
    Store(#[from] arkfile_store::StoreError),
}
