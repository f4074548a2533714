use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::schema::SCHEMA;
use crate::types::{OpaqueRecord, RefreshTokenRecord, TotpSetupRecord, TotpState};

/// Default store-call deadline (§5: "default 10s for store calls"), used by
/// [`AuthStore::open`]. Callers that have a `Config` should prefer
/// [`AuthStore::open_with_timeout`] instead.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Transactional interface over a SQLite-backed store. All operations are
/// synchronous SQLite calls; the public API wraps them in
/// `tokio::task::spawn_blocking` so a slow disk write cannot stall the async
/// reactor (§5).
///
/// Cheaply cloneable — clones share the same connection behind an `Arc`.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<Inner>,
}

struct Inner {
    conn: StdMutex<Connection>,
    op_timeout: Duration,
}

// Safety: rusqlite::Connection is Send but not Sync. We serialize all access
// through a std Mutex, which makes &Inner safe to share across threads.
unsafe impl Sync for Inner {}

impl AuthStore {
    /// Open (or create) the SQLite database at `path`, or an in-memory
    /// database if `path` is `None` (used by tests), with the default 10s
    /// per-call deadline.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        Self::open_with_timeout(path, DEFAULT_OP_TIMEOUT)
    }

    /// Open the store with an explicit per-call deadline (§5, §6
    /// `store.op_timeout_secs`).
    pub fn open_with_timeout(path: Option<&Path>, op_timeout: Duration) -> Result<Self, StoreError> {
        let conn = match path {
            Some(p) => {
                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                Connection::open(p)?
            }
            None => Connection::open_in_memory()?,
        };

        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            inner: Arc::new(Inner {
                conn: StdMutex::new(conn),
                op_timeout,
            }),
        })
    }

    /// Run `f` against the connection on the blocking thread pool, bounded
    /// by the store's configured deadline. Note the limitation this
    /// implies: once the blocking closure has started, dropping the
    /// `spawn_blocking` join future on timeout stops the *caller* from
    /// waiting any longer, but it does not abort the closure itself — it
    /// keeps running to completion (and keeps holding the connection mutex)
    /// in the background. The deadline bounds the caller's wait, not the
    /// backend's work; a genuinely hung SQLite call still ties up the one
    /// connection until it returns.
    async fn blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        let op_timeout = inner.op_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let conn = inner.conn.lock().expect("auth store lock poisoned");
            f(&conn)
        });

        match tokio::time::timeout(op_timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => Err(StoreError::Timeout),
        }
    }

    // ---- opaque records -------------------------------------------------

    /// Insert a brand-new opaque record. Registration is not idempotent: a
    /// second insert for the same identifier returns `AlreadyExists`.
    pub async fn insert_opaque(&self, record: OpaqueRecord) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO users (username, opaque_record, approved, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.username,
                    record.record,
                    record.approved as i64,
                    record.created_at
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::AlreadyExists)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Retrievable by identifier in a single lookup.
    pub async fn load_opaque(&self, username: &str) -> Result<OpaqueRecord, StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT username, opaque_record, approved, created_at FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(OpaqueRecord {
                        username: row.get(0)?,
                        record: row.get(1)?,
                        approved: row.get::<_, i64>(2)? != 0,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    /// Flip the approval flag (the out-of-scope administrative approval path
    /// writes through this single-column update).
    pub async fn set_approved(&self, username: &str, approved: bool) -> Result<(), StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET approved = ?1 WHERE username = ?2",
                params![approved as i64, username],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    // ---- TOTP state -------------------------------------------------------

    /// Persist a fresh enrollment with `enabled = false, setup_completed =
    /// false`. One row per user: a second enrollment for an already-active
    /// user is rejected by the caller before this is invoked (§4.B).
    pub async fn insert_totp_setup(&self, setup: TotpSetupRecord) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO user_totp
                    (username, secret_ciphertext, secret_nonce, backup_ciphertext, backup_nonce,
                     enabled, setup_completed, created_at, last_used_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, NULL)
                 ON CONFLICT(username) DO UPDATE SET
                    secret_ciphertext = excluded.secret_ciphertext,
                    secret_nonce = excluded.secret_nonce,
                    backup_ciphertext = excluded.backup_ciphertext,
                    backup_nonce = excluded.backup_nonce,
                    enabled = 0,
                    setup_completed = 0,
                    created_at = excluded.created_at,
                    last_used_at = NULL",
                params![
                    setup.username,
                    setup.secret_ciphertext,
                    setup.secret_nonce,
                    setup.backup_ciphertext,
                    setup.backup_nonce,
                    setup.created_at,
                ],
            )?;
            Ok(result)
        })
        .await
        .map(|_| ())
    }

    pub async fn load_totp(&self, username: &str) -> Result<TotpState, StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT username, secret_ciphertext, secret_nonce, backup_ciphertext, backup_nonce,
                        enabled, setup_completed, created_at, last_used_at
                 FROM user_totp WHERE username = ?1",
                params![username],
                |row| {
                    Ok(TotpState {
                        username: row.get(0)?,
                        secret_ciphertext: row.get(1)?,
                        secret_nonce: row.get(2)?,
                        backup_ciphertext: row.get(3)?,
                        backup_nonce: row.get(4)?,
                        enabled: row.get::<_, i64>(5)? != 0,
                        setup_completed: row.get::<_, i64>(6)? != 0,
                        created_at: row.get(7)?,
                        last_used_at: row.get(8)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    /// Compare-and-set on `(enabled, setup_completed)`. `expected_enabled`
    /// guards against a blind update racing a concurrent disable/complete;
    /// callers must have read the current state inside the same logical
    /// operation (§5: "blind updates are forbidden").
    pub async fn update_totp_flags(
        &self,
        username: &str,
        expected_enabled: bool,
        new_enabled: bool,
        new_setup_completed: bool,
        last_used_at: Option<i64>,
    ) -> Result<(), StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE user_totp
                 SET enabled = ?1, setup_completed = ?2, last_used_at = COALESCE(?3, last_used_at)
                 WHERE username = ?4 AND enabled = ?5",
                params![
                    new_enabled as i64,
                    new_setup_completed as i64,
                    last_used_at,
                    username,
                    expected_enabled as i64,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    pub async fn touch_totp_last_used(&self, username: &str, used_at: i64) -> Result<(), StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE user_totp SET last_used_at = ?1 WHERE username = ?2",
                params![used_at, username],
            )?;
            Ok(())
        })
        .await
    }

    // ---- usage logs (replay defense) --------------------------------------

    /// Conditional insert: the linearization point for TOTP replay defense.
    /// If two concurrent validations of the same code race, exactly one
    /// insert succeeds.
    pub async fn insert_totp_usage(
        &self,
        username: &str,
        code_hash: &str,
        window_start: i64,
        used_at: i64,
    ) -> Result<(), StoreError> {
        let username = username.to_string();
        let code_hash = code_hash.to_string();
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO totp_usage_log (username, code_hash, window_start, used_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![username, code_hash, window_start, used_at],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::ReplayConflict)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Conditional insert for backup-code consumption; same semantics as
    /// `insert_totp_usage` but keyed without a window (one-shot, not
    /// time-scoped).
    pub async fn insert_backup_usage(
        &self,
        username: &str,
        code_hash: &str,
        used_at: i64,
    ) -> Result<(), StoreError> {
        let username = username.to_string();
        let code_hash = code_hash.to_string();
        self.blocking(move |conn| {
            let result = conn.execute(
                "INSERT INTO totp_backup_usage (username, code_hash, used_at) VALUES (?1, ?2, ?3)",
                params![username, code_hash, used_at],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::ReplayConflict)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// Clear both usage logs for a user (invoked on `disable`).
    pub async fn clear_usage_logs(&self, username: &str) -> Result<(), StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "DELETE FROM totp_usage_log WHERE username = ?1",
                params![username],
            )?;
            conn.execute(
                "DELETE FROM totp_backup_usage WHERE username = ?1",
                params![username],
            )?;
            Ok(())
        })
        .await
    }

    /// Remove usage-log rows older than the retention window. Idempotent.
    pub async fn cleanup_usage_logs(
        &self,
        totp_cutoff: i64,
        backup_cutoff: i64,
    ) -> Result<(u64, u64), StoreError> {
        self.blocking(move |conn| {
            let totp_removed = conn.execute(
                "DELETE FROM totp_usage_log WHERE used_at < ?1",
                params![totp_cutoff],
            )?;
            let backup_removed = conn.execute(
                "DELETE FROM totp_backup_usage WHERE used_at < ?1",
                params![backup_cutoff],
            )?;
            Ok((totp_removed as u64, backup_removed as u64))
        })
        .await
    }

    // ---- refresh tokens ----------------------------------------------------

    pub async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO refresh_tokens
                    (jti, username, token_hash, issued_at, expires_at, revoked_at, device_fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.jti,
                    record.username,
                    record.token_hash,
                    record.issued_at,
                    record.expires_at,
                    record.revoked_at,
                    record.device_fingerprint,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn lookup_refresh_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let token_hash = token_hash.to_string();
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT jti, username, token_hash, issued_at, expires_at, revoked_at, device_fingerprint
                 FROM refresh_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row| {
                    Ok(RefreshTokenRecord {
                        jti: row.get(0)?,
                        username: row.get(1)?,
                        token_hash: row.get(2)?,
                        issued_at: row.get(3)?,
                        expires_at: row.get(4)?,
                        revoked_at: row.get(5)?,
                        device_fingerprint: row.get(6)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    pub async fn revoke_refresh_by_id(&self, jti: &str, revoked_at: i64) -> Result<(), StoreError> {
        let jti = jti.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE refresh_tokens SET revoked_at = ?1 WHERE jti = ?2 AND revoked_at IS NULL",
                params![revoked_at, jti],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn revoke_all_refresh_for_user(
        &self,
        username: &str,
        revoked_at: i64,
    ) -> Result<u64, StoreError> {
        let username = username.to_string();
        self.blocking(move |conn| {
            let n = conn.execute(
                "UPDATE refresh_tokens SET revoked_at = ?1 WHERE username = ?2 AND revoked_at IS NULL",
                params![revoked_at, username],
            )?;
            Ok(n as u64)
        })
        .await
    }

    /// Atomically revoke the presented token (by id) and insert its
    /// replacement in one transaction. If the commit fails, neither the
    /// revocation nor the insert is observed; the old token stays valid.
    pub async fn rotate_refresh_token(
        &self,
        old_jti: String,
        new_record: RefreshTokenRecord,
        revoked_at: i64,
    ) -> Result<(), StoreError> {
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE refresh_tokens SET revoked_at = ?1 WHERE jti = ?2 AND revoked_at IS NULL",
                params![revoked_at, old_jti],
            )?;
            tx.execute(
                "INSERT INTO refresh_tokens
                    (jti, username, token_hash, issued_at, expires_at, revoked_at, device_fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new_record.jti,
                    new_record.username,
                    new_record.token_hash,
                    new_record.issued_at,
                    new_record.expires_at,
                    new_record.revoked_at,
                    new_record.device_fingerprint,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AuthStore {
        AuthStore::open(None).unwrap()
    }

    #[tokio::test]
    async fn slow_call_past_the_deadline_times_out() {
        let s = AuthStore::open_with_timeout(None, Duration::from_millis(20)).unwrap();
        let err = s
            .blocking(|_conn| {
                std::thread::sleep(Duration::from_millis(200));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Timeout));
    }

    fn opaque(username: &str) -> OpaqueRecord {
        OpaqueRecord {
            username: username.to_string(),
            record: vec![1, 2, 3],
            approved: false,
            created_at: 1000,
        }
    }

    #[tokio::test]
    async fn insert_then_load_opaque() {
        let s = store();
        s.insert_opaque(opaque("alice")).await.unwrap();
        let loaded = s.load_opaque("alice").await.unwrap();
        assert_eq!(loaded.record, vec![1, 2, 3]);
        assert!(!loaded.approved);
    }

    #[tokio::test]
    async fn second_insert_is_already_exists() {
        let s = store();
        s.insert_opaque(opaque("alice")).await.unwrap();
        let err = s.insert_opaque(opaque("alice")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let s = store();
        let err = s.load_opaque("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn set_approved_flips_flag() {
        let s = store();
        s.insert_opaque(opaque("alice")).await.unwrap();
        s.set_approved("alice", true).await.unwrap();
        assert!(s.load_opaque("alice").await.unwrap().approved);
    }

    fn setup(username: &str) -> TotpSetupRecord {
        TotpSetupRecord {
            username: username.to_string(),
            secret_ciphertext: vec![1],
            secret_nonce: vec![2],
            backup_ciphertext: vec![3],
            backup_nonce: vec![4],
            created_at: 1000,
        }
    }

    #[tokio::test]
    async fn totp_setup_defaults_to_disabled() {
        let s = store();
        s.insert_opaque(opaque("alice")).await.unwrap();
        s.insert_totp_setup(setup("alice")).await.unwrap();
        let state = s.load_totp("alice").await.unwrap();
        assert!(!state.enabled);
        assert!(!state.setup_completed);
    }

    #[tokio::test]
    async fn update_totp_flags_requires_matching_expected_state() {
        let s = store();
        s.insert_opaque(opaque("alice")).await.unwrap();
        s.insert_totp_setup(setup("alice")).await.unwrap();

        // expected_enabled=true is wrong (currently false) — rejected.
        let err = s
            .update_totp_flags("alice", true, true, true, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        s.update_totp_flags("alice", false, true, true, Some(1))
            .await
            .unwrap();
        let state = s.load_totp("alice").await.unwrap();
        assert!(state.enabled);
        assert!(state.setup_completed);
    }

    #[tokio::test]
    async fn usage_log_conflict_on_replay() {
        let s = store();
        s.insert_totp_usage("alice", "hash1", 100, 1000).await.unwrap();
        let err = s
            .insert_totp_usage("alice", "hash1", 100, 1001)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReplayConflict));
    }

    #[tokio::test]
    async fn usage_log_allows_different_windows() {
        let s = store();
        s.insert_totp_usage("alice", "hash1", 100, 1000).await.unwrap();
        s.insert_totp_usage("alice", "hash1", 130, 1030).await.unwrap();
    }

    #[tokio::test]
    async fn backup_usage_conflict_on_replay() {
        let s = store();
        s.insert_backup_usage("alice", "codehash", 1000).await.unwrap();
        let err = s
            .insert_backup_usage("alice", "codehash", 1001)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ReplayConflict));
    }

    #[tokio::test]
    async fn clear_usage_logs_removes_both_tables() {
        let s = store();
        s.insert_totp_usage("alice", "h1", 100, 1000).await.unwrap();
        s.insert_backup_usage("alice", "b1", 1000).await.unwrap();
        s.clear_usage_logs("alice").await.unwrap();
        // Replay check after clearing should succeed again (fresh insert).
        s.insert_totp_usage("alice", "h1", 100, 2000).await.unwrap();
        s.insert_backup_usage("alice", "b1", 2000).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_usage_logs_removes_stale_rows_only() {
        let s = store();
        s.insert_totp_usage("alice", "old", 1, 100).await.unwrap();
        s.insert_totp_usage("alice", "new", 2, 5000).await.unwrap();
        s.insert_backup_usage("alice", "old-b", 100).await.unwrap();

        let (totp_removed, backup_removed) = s.cleanup_usage_logs(1000, 1000).await.unwrap();
        assert_eq!(totp_removed, 1);
        assert_eq!(backup_removed, 1);

        // The fresh row survives.
        let err = s.insert_totp_usage("alice", "new", 2, 5001).await.unwrap_err();
        assert!(matches!(err, StoreError::ReplayConflict));
    }

    fn refresh(jti: &str, username: &str, hash: &str) -> RefreshTokenRecord {
        RefreshTokenRecord {
            jti: jti.to_string(),
            username: username.to_string(),
            token_hash: hash.to_string(),
            issued_at: 1000,
            expires_at: 2000,
            revoked_at: None,
            device_fingerprint: None,
        }
    }

    #[tokio::test]
    async fn insert_and_lookup_refresh_by_hash() {
        let s = store();
        s.insert_refresh_token(refresh("jti-1", "alice", "hash-1"))
            .await
            .unwrap();
        let loaded = s.lookup_refresh_by_hash("hash-1").await.unwrap();
        assert_eq!(loaded.jti, "jti-1");
        assert!(loaded.is_usable(1500));
    }

    #[tokio::test]
    async fn revoke_all_marks_every_token_for_user() {
        let s = store();
        s.insert_refresh_token(refresh("jti-1", "alice", "hash-1"))
            .await
            .unwrap();
        s.insert_refresh_token(refresh("jti-2", "alice", "hash-2"))
            .await
            .unwrap();
        s.insert_refresh_token(refresh("jti-3", "bob", "hash-3"))
            .await
            .unwrap();

        let revoked = s.revoke_all_refresh_for_user("alice", 1500).await.unwrap();
        assert_eq!(revoked, 2);

        assert!(!s.lookup_refresh_by_hash("hash-1").await.unwrap().is_usable(1600));
        assert!(!s.lookup_refresh_by_hash("hash-2").await.unwrap().is_usable(1600));
        assert!(s.lookup_refresh_by_hash("hash-3").await.unwrap().is_usable(1600));
    }

    #[tokio::test]
    async fn rotate_refresh_token_is_atomic() {
        let s = store();
        s.insert_refresh_token(refresh("jti-1", "alice", "hash-1"))
            .await
            .unwrap();

        s.rotate_refresh_token("jti-1".into(), refresh("jti-2", "alice", "hash-2"), 1500)
            .await
            .unwrap();

        assert!(!s.lookup_refresh_by_hash("hash-1").await.unwrap().is_usable(1600));
        assert!(s.lookup_refresh_by_hash("hash-2").await.unwrap().is_usable(1600));
    }

    #[tokio::test]
    async fn schema_reopen_on_same_file_is_cheap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.db");
        {
            let s = AuthStore::open(Some(&path)).unwrap();
            s.insert_opaque(opaque("alice")).await.unwrap();
        }
        let s2 = AuthStore::open(Some(&path)).unwrap();
        let loaded = s2.load_opaque("alice").await.unwrap();
        assert_eq!(loaded.username, "alice");
    }
}
