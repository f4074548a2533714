/// The opaque envelope produced by PAKE registration, keyed by stable user
/// identifier (email or username). Immutable after creation except via a
/// full re-registration (password change).
#[derive(Debug, Clone)]
pub struct OpaqueRecord {
    pub username: String,
    pub record: Vec<u8>,
    pub approved: bool,
    pub created_at: i64,
}

/// Persisted TOTP state for one user. `enabled` implies `setup_completed`;
/// a user has at most one row.
#[derive(Debug, Clone)]
pub struct TotpState {
    pub username: String,
    pub secret_ciphertext: Vec<u8>,
    pub secret_nonce: Vec<u8>,
    pub backup_ciphertext: Vec<u8>,
    pub backup_nonce: Vec<u8>,
    pub enabled: bool,
    pub setup_completed: bool,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
}

/// A fresh (not-yet-enabled) TOTP enrollment to persist.
pub struct TotpSetupRecord {
    pub username: String,
    pub secret_ciphertext: Vec<u8>,
    pub secret_nonce: Vec<u8>,
    pub backup_ciphertext: Vec<u8>,
    pub backup_nonce: Vec<u8>,
    pub created_at: i64,
}

/// A refresh token record. Usable iff `revoked_at.is_none() && now < expires_at`.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub username: String,
    pub token_hash: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
    pub device_fingerprint: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_usable(&self, now: i64) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}
