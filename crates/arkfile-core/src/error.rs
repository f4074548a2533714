use thiserror::Error;

/// Crate-wide error taxonomy (§7). Every component funnels into this enum so
/// call sites match on a closed set instead of threading ad hoc strings.
/// Each variant maps 1:1 to the HTTP status/code pairing an external router
/// would use (§6) via [`AuthError::http_code`]; that mapping is specified
/// here so two independent HTTP layers built against this core agree on
/// wire codes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("PAKE rejected the exchange")]
    BadCredentials,

    #[error("identifier already exists")]
    AlreadyExists,

    #[error("user exists but lacks administrative approval")]
    NotApproved,

    #[error("code did not validate")]
    InvalidCode,

    #[error("code already recorded for this window")]
    ReplayDetected,

    #[error("token has expired")]
    Expired,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token is malformed")]
    Malformed,

    #[error("no bearer token present")]
    MissingToken,

    #[error("PAKE protocol deviation")]
    ProtocolError,

    #[error("backing store error: {0}")]
    StoreError(String),

    #[error("key material could not be loaded: {0}")]
    KeyLoadError(String),
}

impl AuthError {
    /// `(http_status, stable_machine_code)` — the pairing an external HTTP
    /// router maps this error onto (§6's response table, §7's propagation
    /// policy).
    pub fn http_code(&self) -> (u16, &'static str) {
        match self {
            AuthError::BadCredentials => (401, "BadCredentials"),
            AuthError::AlreadyExists => (409, "AlreadyExists"),
            AuthError::NotApproved => (403, "NotApproved"),
            AuthError::InvalidCode => (400, "InvalidCode"),
            AuthError::ReplayDetected => (429, "ReplayDetected"),
            AuthError::Expired => (401, "Expired"),
            AuthError::BadSignature => (401, "BadSignature"),
            AuthError::Malformed => (401, "Malformed"),
            AuthError::MissingToken => (401, "MissingToken"),
            AuthError::ProtocolError => (503, "PakeUnavailable"),
            AuthError::StoreError(_) => (503, "StoreError"),
            AuthError::KeyLoadError(_) => (503, "KeyLoadError"),
        }
    }
}

impl From<arkfile_pake::PakeError> for AuthError {
    fn from(err: arkfile_pake::PakeError) -> Self {
        match err {
            arkfile_pake::PakeError::BadCredentials => AuthError::BadCredentials,
            arkfile_pake::PakeError::Protocol | arkfile_pake::PakeError::Serialization(_) => {
                AuthError::ProtocolError
            }
            arkfile_pake::PakeError::KeyLoad(msg) => AuthError::KeyLoadError(msg),
        }
    }
}

impl From<arkfile_totp::TotpError> for AuthError {
    fn from(err: arkfile_totp::TotpError) -> Self {
        use arkfile_totp::TotpError::*;
        match err {
            AlreadyEnrolled => AuthError::AlreadyExists,
            NotEnrolled | NotEnabled | InvalidCode | Decryption => AuthError::InvalidCode,
            ReplayDetected => AuthError::ReplayDetected,
            Config(msg) => AuthError::KeyLoadError(msg),
            Store(e) => e.into(),
        }
    }
}

impl From<arkfile_token::TokenError> for AuthError {
    fn from(err: arkfile_token::TokenError) -> Self {
        use arkfile_token::TokenError::*;
        match err {
            MissingToken => AuthError::MissingToken,
            Malformed => AuthError::Malformed,
            BadSignature => AuthError::BadSignature,
            Expired => AuthError::Expired,
            NotFound => AuthError::BadCredentials,
            KeyLoad(msg) => AuthError::KeyLoadError(msg),
            Store(e) => e.into(),
        }
    }
}

impl From<arkfile_store::StoreError> for AuthError {
    fn from(err: arkfile_store::StoreError) -> Self {
        use arkfile_store::StoreError::*;
        match err {
            AlreadyExists => AuthError::AlreadyExists,
            NotFound => AuthError::BadCredentials,
            ReplayConflict => AuthError::ReplayDetected,
            Timeout => AuthError::StoreError("store call exceeded its deadline".into()),
            Backend(e) => AuthError::StoreError(e.to_string()),
            Blocking(e) => AuthError::StoreError(e.to_string()),
        }
    }
}

impl From<arkfile_crypto::CryptoError> for AuthError {
    fn from(err: arkfile_crypto::CryptoError) -> Self {
        AuthError::KeyLoadError(err.to_string())
    }
}
