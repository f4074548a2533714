use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

const SESSION_INFO: &[u8] = b"arkfile-session-v1";

/// A 32-byte symmetric secret bound to one successful login. Used by the
/// client as the key for account-password file encryption; the server never
/// persists it past the response that carries it.
#[derive(ZeroizeOnDrop)]
pub struct SessionKey(pub [u8; 32]);

impl SessionKey {
    /// Derive the session key from the PAKE export key via domain-separated
    /// HKDF. The export key and the derived session key are distinct values:
    /// compromising one does not trivially hand over the other's domain.
    pub fn derive(export_key: &[u8]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(None, export_key);
        let mut out = [0u8; 32];
        hk.expand(SESSION_INFO, &mut out)
            .map_err(|e| CryptoError::Derivation(e.to_string()))?;
        Ok(Self(out))
    }

    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_export_key_yields_same_session_key() {
        let export_key = [0x11u8; 32];
        let a = SessionKey::derive(&export_key).unwrap();
        let b = SessionKey::derive(&export_key).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn different_export_keys_yield_different_session_keys() {
        let a = SessionKey::derive(&[0x11u8; 32]).unwrap();
        let b = SessionKey::derive(&[0x22u8; 32]).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn session_key_is_not_the_export_key() {
        let export_key = [0x33u8; 32];
        let session = SessionKey::derive(&export_key).unwrap();
        assert_ne!(session.0, export_key);
    }

    #[test]
    fn base64_roundtrips_through_standard_engine() {
        use base64::Engine;
        let session = SessionKey::derive(&[0x44u8; 32]).unwrap();
        let encoded = session.to_base64();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        assert_eq!(decoded, session.0);
    }
}
