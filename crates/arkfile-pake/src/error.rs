use thiserror::Error;

/// Errors surfaced by the PAKE Engine. Cryptographic deviations are fatal
/// for the in-flight exchange: callers never retry a `Protocol` or
/// `BadCredentials` failure, they restart from round one.
#[derive(Debug, Error)]
pub enum PakeError {
    #[error("PAKE protocol error")]
    Protocol,

    #[error("credential verification failed")]
    BadCredentials,

    #[error("malformed protocol message: {0}")]
    Serialization(String),

    #[error("server key material could not be loaded: {0}")]
    KeyLoad(String),
}

impl From<opaque_ke::errors::ProtocolError> for PakeError {
    fn from(err: opaque_ke::errors::ProtocolError) -> Self {
        match err {
            opaque_ke::errors::ProtocolError::InvalidLoginError => PakeError::BadCredentials,
            other => PakeError::Serialization(other.to_string()),
        }
    }
}
