use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::TotpError;

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` under the per-user TOTP encryption key, returning
/// `(ciphertext, nonce)`. A fresh nonce is drawn for every call.
pub fn encrypt(user_key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TotpError> {
    let cipher = ChaCha20Poly1305::new_from_slice(user_key).map_err(|_| TotpError::Decryption)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| TotpError::Decryption)?;
    Ok((ciphertext, nonce_bytes.to_vec()))
}

/// Decrypt a blob previously produced by [`encrypt`] under the same key.
pub fn decrypt(user_key: &[u8; 32], ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, TotpError> {
    let cipher = ChaCha20Poly1305::new_from_slice(user_key).map_err(|_| TotpError::Decryption)?;
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| TotpError::Decryption)
}

/// Salted fingerprint of a presented code (or backup code), used as the
/// usage log key. Salting with the per-user TOTP key means a store
/// compromise alone does not reveal which codes have been presented.
pub fn fingerprint(user_key: &[u8; 32], payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_key);
    hasher.update(payload);
    hex::encode(hasher.finalize())
}
