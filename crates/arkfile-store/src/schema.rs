/// Schema creation is idempotent: every `open()` issues this batch once and
/// `CREATE TABLE IF NOT EXISTS` makes repeated opens against the same file
/// cheap.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    username    TEXT PRIMARY KEY NOT NULL,
    opaque_record BLOB NOT NULL,
    approved    INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_totp (
    username            TEXT PRIMARY KEY NOT NULL REFERENCES users(username),
    secret_ciphertext   BLOB NOT NULL,
    secret_nonce        BLOB NOT NULL,
    backup_ciphertext   BLOB NOT NULL,
    backup_nonce        BLOB NOT NULL,
    enabled             INTEGER NOT NULL DEFAULT 0,
    setup_completed     INTEGER NOT NULL DEFAULT 0,
    created_at          INTEGER NOT NULL,
    last_used_at        INTEGER
);

CREATE TABLE IF NOT EXISTS totp_usage_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    username     TEXT NOT NULL,
    code_hash    TEXT NOT NULL,
    window_start INTEGER NOT NULL,
    used_at      INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_totp_usage_unique
    ON totp_usage_log(username, code_hash, window_start);

CREATE TABLE IF NOT EXISTS totp_backup_usage (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    username  TEXT NOT NULL,
    code_hash TEXT NOT NULL,
    used_at   INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_totp_backup_unique
    ON totp_backup_usage(username, code_hash);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    jti                TEXT PRIMARY KEY NOT NULL,
    username           TEXT NOT NULL,
    token_hash         TEXT NOT NULL UNIQUE,
    issued_at          INTEGER NOT NULL,
    expires_at         INTEGER NOT NULL,
    revoked_at         INTEGER,
    device_fingerprint TEXT
);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_hash ON refresh_tokens(token_hash);
CREATE INDEX IF NOT EXISTS idx_refresh_tokens_username ON refresh_tokens(username);
";
