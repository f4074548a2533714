use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};

use arkfile_store::{AuthStore, StoreError, TotpSetupRecord};

use crate::backup::{generate_backup_codes, normalize};
use crate::crypto;
use crate::error::TotpError;

const TOTP_STEP: u64 = 30;
const TOTP_ALGORITHM: Algorithm = Algorithm::SHA1;
const TOTP_RETENTION_SECS: i64 = 24 * 3600;
const BACKUP_RETENTION_SECS: i64 = 90 * 24 * 3600;

/// Deployment-specific TOTP parameters; loaded from `Config` rather than
/// hardcoded so the issuer string and digit count don't require a recompile
/// per deployment.
#[derive(Debug, Clone)]
pub struct TotpConfig {
    pub issuer: String,
    pub digits: usize,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            issuer: "Arkfile".to_string(),
            digits: 6,
        }
    }
}

/// Plaintext enrollment material handed to the caller exactly once, at
/// `generate_setup` time. Never persisted in this form.
#[derive(Debug, Clone)]
pub struct TotpSetup {
    pub secret_base32: String,
    pub qr_url: String,
    pub manual_entry: String,
    pub backup_codes: Vec<String>,
}

/// Enrolls users in TOTP, validates codes with replay protection, manages
/// backup codes, and disables TOTP.
pub struct TotpService {
    store: AuthStore,
    config: TotpConfig,
}

impl TotpService {
    pub fn new(store: AuthStore, config: TotpConfig) -> Self {
        Self { store, config }
    }

    /// Draw a fresh secret and backup-code set. Pure: no I/O, no state
    /// change. `store_setup` is what persists the result.
    pub fn generate_setup(&self, username: &str) -> Result<TotpSetup, TotpError> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|e| TotpError::Config(e.to_string()))?;
        let totp = build_totp(&self.config, &secret_bytes, username)?;
        let qr_url = totp.get_url();
        let secret_base32 = secret.to_encoded().to_string();
        let manual_entry = group_for_display(&secret_base32);
        let backup_codes = generate_backup_codes();

        Ok(TotpSetup {
            secret_base32,
            qr_url,
            manual_entry,
            backup_codes,
        })
    }

    /// Encrypt and persist a freshly generated setup with
    /// `enabled=false, setup_completed=false`. Rejects re-enrollment over an
    /// already-active TOTP state; re-running setup before `complete_setup`
    /// simply overwrites the pending enrollment.
    pub async fn store_setup(
        &self,
        username: &str,
        user_key: &[u8; 32],
        setup: &TotpSetup,
        now: i64,
    ) -> Result<(), TotpError> {
        if let Ok(existing) = self.store.load_totp(username).await {
            if existing.enabled {
                return Err(TotpError::AlreadyEnrolled);
            }
        }

        let secret_bytes = Secret::Encoded(setup.secret_base32.clone())
            .to_bytes()
            .map_err(|e| TotpError::Config(e.to_string()))?;
        let (secret_ciphertext, secret_nonce) = crypto::encrypt(user_key, &secret_bytes)?;

        let backup_json = serde_json::to_vec(&setup.backup_codes)
            .expect("backup code list always serializes");
        let (backup_ciphertext, backup_nonce) = crypto::encrypt(user_key, &backup_json)?;

        self.store
            .insert_totp_setup(TotpSetupRecord {
                username: username.to_string(),
                secret_ciphertext,
                secret_nonce,
                backup_ciphertext,
                backup_nonce,
                created_at: now,
            })
            .await?;
        Ok(())
    }

    /// Load the encrypted secret, decrypt, compute the expected TOTP for the
    /// current window (±1 step), compare in constant time. On success, flip
    /// `enabled=true, setup_completed=true` and record usage. On failure,
    /// state is untouched.
    pub async fn complete_setup(
        &self,
        username: &str,
        user_key: &[u8; 32],
        code: &str,
        now: i64,
    ) -> Result<(), TotpError> {
        let state = self
            .store
            .load_totp(username)
            .await
            .map_err(|_| TotpError::NotEnrolled)?;
        if state.setup_completed {
            return Err(TotpError::AlreadyEnrolled);
        }

        let secret = crypto::decrypt(user_key, &state.secret_ciphertext, &state.secret_nonce)?;
        let totp = build_totp(&self.config, &secret, username)?;
        let window_start = match_window(&totp, code, now)?;

        let code_hash = crypto::fingerprint(user_key, format!("{username}:{code}").as_bytes());
        self.store
            .insert_totp_usage(username, &code_hash, window_start, now)
            .await
            .map_err(map_store_replay)?;

        self.store
            .update_totp_flags(username, false, true, true, Some(now))
            .await?;
        Ok(())
    }

    /// Reject if TOTP is not enabled. Accept the current window and one
    /// window on either side. A conditional insert into the usage log is
    /// the linearization point for replay defense.
    pub async fn validate_code(
        &self,
        username: &str,
        user_key: &[u8; 32],
        code: &str,
        now: i64,
    ) -> Result<(), TotpError> {
        let state = self
            .store
            .load_totp(username)
            .await
            .map_err(|_| TotpError::NotEnrolled)?;
        if !state.enabled {
            return Err(TotpError::NotEnabled);
        }

        let secret = crypto::decrypt(user_key, &state.secret_ciphertext, &state.secret_nonce)?;
        let totp = build_totp(&self.config, &secret, username)?;
        let window_start = match_window(&totp, code, now)?;

        let code_hash = crypto::fingerprint(user_key, format!("{username}:{code}").as_bytes());
        self.store
            .insert_totp_usage(username, &code_hash, window_start, now)
            .await
            .map_err(map_store_replay)?;

        self.store.touch_totp_last_used(username, now).await?;
        Ok(())
    }

    /// Normalize, search the decrypted backup set in constant time, then
    /// attempt a conditional insert into the backup usage log. The code is
    /// burned on success: a second presentation of the same code fails with
    /// `ReplayDetected`, not `InvalidCode`, because the set itself never
    /// shrinks — the usage log is the source of truth for consumption.
    pub async fn validate_backup(
        &self,
        username: &str,
        user_key: &[u8; 32],
        code: &str,
        now: i64,
    ) -> Result<(), TotpError> {
        let state = self
            .store
            .load_totp(username)
            .await
            .map_err(|_| TotpError::NotEnrolled)?;
        if !state.enabled {
            return Err(TotpError::NotEnabled);
        }

        let normalized = normalize(code);
        let backup_json = crypto::decrypt(user_key, &state.backup_ciphertext, &state.backup_nonce)?;
        let codes: Vec<String> =
            serde_json::from_slice(&backup_json).map_err(|e| TotpError::Config(e.to_string()))?;

        let found = codes.iter().fold(false, |acc, candidate| {
            acc | bool::from(candidate.as_bytes().ct_eq(normalized.as_bytes()))
        });
        if !found {
            return Err(TotpError::InvalidCode);
        }

        let code_hash = crypto::fingerprint(user_key, format!("{username}:{normalized}").as_bytes());
        self.store
            .insert_backup_usage(username, &code_hash, now)
            .await
            .map_err(map_store_replay)?;

        self.store.touch_totp_last_used(username, now).await?;
        Ok(())
    }

    /// Requires a currently valid TOTP code (never a backup code — backup
    /// codes don't match against the TOTP secret, so presenting one here
    /// always fails with `InvalidCode`). On success, clears both usage logs
    /// for the user.
    pub async fn disable(
        &self,
        username: &str,
        user_key: &[u8; 32],
        code: &str,
        now: i64,
    ) -> Result<(), TotpError> {
        let state = self
            .store
            .load_totp(username)
            .await
            .map_err(|_| TotpError::NotEnrolled)?;
        if !state.enabled {
            return Err(TotpError::NotEnabled);
        }

        let secret = crypto::decrypt(user_key, &state.secret_ciphertext, &state.secret_nonce)?;
        let totp = build_totp(&self.config, &secret, username)?;
        let window_start = match_window(&totp, code, now)?;

        let code_hash = crypto::fingerprint(user_key, format!("{username}:{code}").as_bytes());
        self.store
            .insert_totp_usage(username, &code_hash, window_start, now)
            .await
            .map_err(map_store_replay)?;

        self.store
            .update_totp_flags(username, true, false, true, Some(now))
            .await?;
        self.store.clear_usage_logs(username).await?;
        Ok(())
    }

    /// Remove usage-log rows older than the retention window (24h for TOTP,
    /// 90d for backup codes). Idempotent.
    pub async fn cleanup_logs(&self, now: i64) -> Result<(u64, u64), TotpError> {
        Ok(self
            .store
            .cleanup_usage_logs(now - TOTP_RETENTION_SECS, now - BACKUP_RETENTION_SECS)
            .await?)
    }
}

fn build_totp(config: &TotpConfig, secret_bytes: &[u8], account: &str) -> Result<TOTP, TotpError> {
    TOTP::new(
        TOTP_ALGORITHM,
        config.digits,
        1,
        TOTP_STEP,
        secret_bytes.to_vec(),
        Some(config.issuer.clone()),
        account.to_string(),
    )
    .map_err(|e| TotpError::Config(e.to_string()))
}

/// Try the current window and one window on either side (3-window
/// tolerance); return the matched window's start time, or `InvalidCode` if
/// none match. Clock skew beyond one window is indistinguishable from an
/// invalid code, per §4.B's edge case.
fn match_window(totp: &TOTP, code: &str, now: i64) -> Result<i64, TotpError> {
    let now = now.max(0) as u64;
    for offset in [-1i64, 0, 1] {
        let candidate_time = (now as i64 + offset * TOTP_STEP as i64).max(0) as u64;
        let candidate_code = totp.generate(candidate_time);
        if candidate_code.as_bytes().len() == code.as_bytes().len()
            && bool::from(candidate_code.as_bytes().ct_eq(code.as_bytes()))
        {
            let window_start = (candidate_time / TOTP_STEP) * TOTP_STEP;
            return Ok(window_start as i64);
        }
    }
    Err(TotpError::InvalidCode)
}

fn map_store_replay(err: StoreError) -> TotpError {
    match err {
        StoreError::ReplayConflict => TotpError::ReplayDetected,
        other => TotpError::Store(other),
    }
}

fn group_for_display(secret_base32: &str) -> String {
    secret_base32
        .as_bytes()
        .chunks(4)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(" ")
}
