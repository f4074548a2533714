use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const MASTER_KEY_FILE: &str = "totp_master.key";
const MASTER_KEY_BYTES: usize = 32;
const DERIVE_SALT: &[u8] = b"arkfile-totp-v1";

/// The process-wide TOTP master key. Zeroized on drop; never cloned, never logged.
#[derive(ZeroizeOnDrop)]
struct MasterKey([u8; MASTER_KEY_BYTES]);

/// A 32-byte key derived from the master key for a single user, owned for the
/// span of one operation and zeroized on every exit path.
#[derive(ZeroizeOnDrop)]
pub struct DerivedKey(pub [u8; 32]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Owns the server's process-wide TOTP master key and derives per-user keys
/// from it. The master key itself is never exposed outside this module.
pub struct ServerKeyManager {
    key_dir: PathBuf,
    master: OnceLock<MasterKey>,
}

impl ServerKeyManager {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
            master: OnceLock::new(),
        }
    }

    /// Load the master key from disk, or generate and persist a fresh one if
    /// none exists. Idempotent: a second call against an already-initialized
    /// manager is a no-op. Must complete before the first request is admitted;
    /// any failure here is fatal to process startup.
    pub fn init_master(&self) -> Result<(), CryptoError> {
        if self.master.get().is_some() {
            return Ok(());
        }

        let path = self.key_dir.join(MASTER_KEY_FILE);
        let key = if path.exists() {
            load_master_key(&path)?
        } else {
            fs::create_dir_all(&self.key_dir).map_err(|e| {
                CryptoError::KeyLoad(format!(
                    "failed to create key directory {}: {e}",
                    self.key_dir.display()
                ))
            })?;
            generate_and_store_master_key(&path)?
        };

        self.master
            .set(MasterKey(key))
            .map_err(|_| CryptoError::AlreadyInitialized)?;

        tracing::info!(key_dir = %self.key_dir.display(), "TOTP master key initialized");
        Ok(())
    }

    /// Deterministically derive a 32-byte key for `username` via
    /// HKDF-SHA256(salt = "arkfile-totp-v1", info = username) over the master
    /// key. Equal usernames always yield equal keys; distinct usernames yield
    /// distinct keys with negligible collision probability.
    pub fn derive_user_key(&self, username: &str) -> Result<DerivedKey, CryptoError> {
        let master = self.master.get().ok_or(CryptoError::NotInitialized)?;

        let hk = Hkdf::<Sha256>::new(Some(DERIVE_SALT), &master.0);
        let mut out = [0u8; 32];
        hk.expand(username.as_bytes(), &mut out)
            .map_err(|e| CryptoError::Derivation(e.to_string()))?;
        Ok(DerivedKey(out))
    }
}

/// Overwrite a byte buffer before it is released. Thin wrapper so call sites
/// read as an explicit lifecycle step rather than relying on `Drop` alone.
pub fn zeroize(mut buf: impl AsMut<[u8]>) {
    buf.as_mut().zeroize();
}

fn load_master_key(path: &Path) -> Result<[u8; MASTER_KEY_BYTES], CryptoError> {
    let hex_str = fs::read_to_string(path)
        .map_err(|e| CryptoError::KeyLoad(format!("failed to read {}: {e}", path.display())))?;
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| CryptoError::KeyLoad(format!("malformed master key file: {e}")))?;
    if bytes.len() != MASTER_KEY_BYTES {
        return Err(CryptoError::KeyLoad(format!(
            "master key has invalid length: expected {MASTER_KEY_BYTES}, got {}",
            bytes.len()
        )));
    }
    let mut key = [0u8; MASTER_KEY_BYTES];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn generate_and_store_master_key(path: &Path) -> Result<[u8; MASTER_KEY_BYTES], CryptoError> {
    let mut key = [0u8; MASTER_KEY_BYTES];
    OsRng.fill_bytes(&mut key);

    fs::write(path, hex::encode(key))
        .map_err(|e| CryptoError::KeyLoad(format!("failed to write {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            CryptoError::KeyLoad(format!(
                "failed to set permissions on {}: {e}",
                path.display()
            ))
        })?;
    }

    // Re-read to confirm the write landed before admitting the first request.
    let confirmed = load_master_key(path)?;
    if confirmed != key {
        return Err(CryptoError::KeyLoad(
            "master key readback did not match what was written".into(),
        ));
    }

    tracing::info!(path = %path.display(), "generated fresh TOTP master key");
    Ok(key)
}
