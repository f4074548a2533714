use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::TokenError;

const SIGNING_DIR: &str = "signing";
const KEYS_DIR: &str = "keys";
const CURRENT_FILE: &str = "current.kid";
const ORDER_FILE: &str = "order.json";
const SECRET_BYTES: usize = 32;

/// One HMAC signing key: a `kid` and its 32-byte secret. Every key in the
/// ring remains valid for *verification* until evicted; only the current
/// key is used to *sign* new tokens.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub secret: [u8; SECRET_BYTES],
}

/// Current signing key plus a bounded ring of previous verification-only
/// keys (§4.D supplement). Rotation swaps the "current" pointer; the
/// retired key keeps verifying tokens issued under it until they expire
/// naturally and fall out of the ring.
pub struct SigningKeyRing {
    key_dir: PathBuf,
    current: RwLock<Arc<SigningKey>>,
    verification: DashMap<String, Arc<SigningKey>>,
    order: RwLock<Vec<String>>,
    ring_size: usize,
}

impl SigningKeyRing {
    /// Load the ring from `key_dir`, or bootstrap a fresh single-key ring on
    /// first boot. A failure here is fatal to process startup (§7
    /// `KeyLoadError`).
    pub fn init(key_dir: &Path, ring_size: usize) -> Result<Self, TokenError> {
        let dir = key_dir.join(SIGNING_DIR);
        let keys_dir = dir.join(KEYS_DIR);
        let current_path = dir.join(CURRENT_FILE);
        let order_path = dir.join(ORDER_FILE);

        if !current_path.exists() {
            fs::create_dir_all(&keys_dir)
                .map_err(|e| TokenError::KeyLoad(format!("creating signing dir: {e}")))?;
            let key = generate_key();
            write_key_file(&keys_dir, &key)?;
            fs::write(&current_path, &key.kid)
                .map_err(|e| TokenError::KeyLoad(format!("writing current.kid: {e}")))?;
            let order = vec![key.kid.clone()];
            fs::write(
                &order_path,
                serde_json::to_vec(&order).expect("order list always serializes"),
            )
            .map_err(|e| TokenError::KeyLoad(format!("writing order.json: {e}")))?;

            let verification = DashMap::new();
            verification.insert(key.kid.clone(), Arc::new(key.clone()));
            tracing::info!(kid = %key.kid, "generated fresh JWT signing key");
            return Ok(Self {
                key_dir: dir,
                current: RwLock::new(Arc::new(key)),
                verification,
                order: RwLock::new(order),
                ring_size,
            });
        }

        let current_kid = fs::read_to_string(&current_path)
            .map_err(|e| TokenError::KeyLoad(format!("reading current.kid: {e}")))?
            .trim()
            .to_string();
        let order: Vec<String> = fs::read_to_string(&order_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| vec![current_kid.clone()]);

        let verification = DashMap::new();
        for kid in &order {
            let key = read_key_file(&keys_dir, kid)?;
            verification.insert(kid.clone(), Arc::new(key));
        }
        let current = verification
            .get(&current_kid)
            .map(|k| k.clone())
            .ok_or_else(|| TokenError::KeyLoad(format!("current kid {current_kid} has no key file")))?;

        Ok(Self {
            key_dir: dir,
            current: RwLock::new(current),
            verification,
            order: RwLock::new(order),
            ring_size,
        })
    }

    /// The active signing key, for producing new tokens.
    pub fn current(&self) -> Arc<SigningKey> {
        self.current.read().expect("signing ring lock poisoned").clone()
    }

    /// Look up a key by `kid` for verification purposes. Returns keys that
    /// have since been rotated out of signing but remain in the ring.
    pub fn verification_key(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.verification.get(kid).map(|k| k.clone())
    }

    /// Generate a new `kid` + secret, make it the signing key for all new
    /// tokens, and retain the previous signing key in the verification ring
    /// — bounded by `ring_size`, oldest evicted first.
    pub fn rotate(&self) -> Result<(), TokenError> {
        let keys_dir = self.key_dir.join(KEYS_DIR);
        let key = generate_key();
        write_key_file(&keys_dir, &key)?;

        let arc_key = Arc::new(key.clone());
        self.verification.insert(key.kid.clone(), arc_key.clone());

        {
            let mut current = self.current.write().expect("signing ring lock poisoned");
            *current = arc_key;
        }
        fs::write(self.key_dir.join(CURRENT_FILE), &key.kid)
            .map_err(|e| TokenError::KeyLoad(format!("updating current.kid: {e}")))?;

        let evicted = {
            let mut order = self.order.write().expect("signing ring lock poisoned");
            order.push(key.kid.clone());
            let mut evicted = None;
            if order.len() > self.ring_size {
                evicted = Some(order.remove(0));
            }
            fs::write(
                self.key_dir.join(ORDER_FILE),
                serde_json::to_vec(&*order).expect("order list always serializes"),
            )
            .map_err(|e| TokenError::KeyLoad(format!("updating order.json: {e}")))?;
            evicted
        };

        if let Some(old_kid) = evicted {
            self.verification.remove(&old_kid);
            let _ = fs::remove_file(keys_dir.join(format!("{old_kid}.key")));
            tracing::info!(kid = %old_kid, "evicted retired signing key from verification ring");
        }

        tracing::info!(kid = %key.kid, "rotated JWT signing key");
        Ok(())
    }
}

fn generate_key() -> SigningKey {
    let mut secret = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut secret);
    SigningKey {
        kid: uuid::Uuid::new_v4().to_string(),
        secret,
    }
}

fn write_key_file(keys_dir: &Path, key: &SigningKey) -> Result<(), TokenError> {
    let path = keys_dir.join(format!("{}.key", key.kid));
    fs::write(&path, hex::encode(key.secret))
        .map_err(|e| TokenError::KeyLoad(format!("writing {}: {e}", path.display())))?;
    #[cfg(unix)]
    {
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .map_err(|e| TokenError::KeyLoad(format!("chmod {}: {e}", path.display())))?;
    }
    Ok(())
}

fn read_key_file(keys_dir: &Path, kid: &str) -> Result<SigningKey, TokenError> {
    let path = keys_dir.join(format!("{kid}.key"));
    let hex_str = fs::read_to_string(&path)
        .map_err(|e| TokenError::KeyLoad(format!("reading {}: {e}", path.display())))?;
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| TokenError::KeyLoad(format!("malformed signing key {kid}: {e}")))?;
    if bytes.len() != SECRET_BYTES {
        return Err(TokenError::KeyLoad(format!(
            "signing key {kid} has invalid length {}",
            bytes.len()
        )));
    }
    let mut secret = [0u8; SECRET_BYTES];
    secret.copy_from_slice(&bytes);
    Ok(SigningKey {
        kid: kid.to_string(),
        secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstraps_a_single_key_on_first_boot() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SigningKeyRing::init(dir.path(), 5).unwrap();
        let current = ring.current();
        assert!(ring.verification_key(&current.kid).is_some());
    }

    #[test]
    fn reloads_identically_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let ring1 = SigningKeyRing::init(dir.path(), 5).unwrap();
        let kid1 = ring1.current().kid.clone();
        let secret1 = ring1.current().secret;
        drop(ring1);

        let ring2 = SigningKeyRing::init(dir.path(), 5).unwrap();
        assert_eq!(ring2.current().kid, kid1);
        assert_eq!(ring2.current().secret, secret1);
    }

    #[test]
    fn rotation_keeps_old_key_verifying() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SigningKeyRing::init(dir.path(), 5).unwrap();
        let old_kid = ring.current().kid.clone();

        ring.rotate().unwrap();
        let new_kid = ring.current().kid.clone();

        assert_ne!(old_kid, new_kid);
        assert!(ring.verification_key(&old_kid).is_some());
        assert!(ring.verification_key(&new_kid).is_some());
    }

    #[test]
    fn ring_evicts_oldest_beyond_bound() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SigningKeyRing::init(dir.path(), 2).unwrap();
        let kid0 = ring.current().kid.clone();

        ring.rotate().unwrap();
        let kid1 = ring.current().kid.clone();
        ring.rotate().unwrap();
        let kid2 = ring.current().kid.clone();

        // Ring size 2: kid0 should have been evicted once kid2 pushed it out.
        assert!(ring.verification_key(&kid0).is_none());
        assert!(ring.verification_key(&kid1).is_some());
        assert!(ring.verification_key(&kid2).is_some());
    }
}
