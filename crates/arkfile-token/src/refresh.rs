use base64::Engine;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

const REFRESH_TOKEN_BYTES: usize = 32;

/// Draw a fresh opaque refresh token: 32 bytes of randomness, URL-safe
/// base64 encoded. The server never stores this value, only its hash.
pub fn generate() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a presented refresh token for lookup/storage. Plain SHA-256 is
/// sufficient here: the input is already 256 bits of uniform randomness, not
/// a human-memorable secret, so there is no dictionary to slow down.
pub fn hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
