use thiserror::Error;

/// Errors surfaced by the TOTP Service.
#[derive(Debug, Error)]
pub enum TotpError {
    #[error("TOTP already enrolled and active for this user")]
    AlreadyEnrolled,

    #[error("no TOTP enrollment for this user")]
    NotEnrolled,

    #[error("TOTP is not enabled for this user")]
    NotEnabled,

    #[error("code did not validate")]
    InvalidCode,

    #[error("code already recorded for this window")]
    ReplayDetected,

    #[error("stored secret could not be decrypted")]
    Decryption,

    #[error("invalid TOTP configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] arkfile_store::StoreError),
}
