use thiserror::Error;

/// Errors surfaced by the server-key lifecycle and session-key derivation.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("failed to load or initialize the master key: {0}")]
    KeyLoad(String),

    #[error("master key already initialized")]
    AlreadyInitialized,

    #[error("master key not initialized")]
    NotInitialized,

    #[error("key derivation failed: {0}")]
    Derivation(String),
}
