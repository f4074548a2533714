use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::claims::{AUDIENCE, Claims, ISSUER};
use crate::error::TokenError;
use crate::signing::SigningKeyRing;

/// Sign `claims` with the ring's current key, stamping the header `kid` so
/// the verifier can select the matching key without guessing.
pub fn sign(ring: &SigningKeyRing, claims: &Claims) -> Result<String, TokenError> {
    let key = ring.current();
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(key.kid.clone());
    encode(&header, claims, &EncodingKey::from_secret(&key.secret))
        .map_err(|_| TokenError::Malformed)
}

/// Parse and verify a compact JWS against the ring. Rejects on bad
/// signature, `exp <= now`, `nbf > now + clock_skew`, or `iss`/`aud`
/// mismatch (§4.D). `now` and `clock_skew_secs` are injected so validation
/// is deterministic under test.
pub fn parse(
    ring: &SigningKeyRing,
    token: &str,
    now: i64,
    clock_skew_secs: i64,
) -> Result<Claims, TokenError> {
    let header = jsonwebtoken::decode_header(token).map_err(|_| TokenError::Malformed)?;
    let kid = header.kid.ok_or(TokenError::Malformed)?;
    let key = ring.verification_key(&kid).ok_or(TokenError::BadSignature)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.set_audience(&[AUDIENCE]);
    validation.validate_nbf = true;
    validation.leeway = clock_skew_secs.max(0) as u64;

    let decoded = decode::<Claims>(token, &DecodingKey::from_secret(&key.secret), &validation)
        .map_err(|e| classify(e.kind(), now))?;

    if decoded.claims.exp <= now {
        return Err(TokenError::Expired);
    }
    Ok(decoded.claims)
}

fn classify(kind: &jsonwebtoken::errors::ErrorKind, _now: i64) -> TokenError {
    use jsonwebtoken::errors::ErrorKind::*;
    match kind {
        ExpiredSignature => TokenError::Expired,
        InvalidSignature | InvalidToken => TokenError::BadSignature,
        ImmatureSignature | InvalidIssuer | InvalidAudience => TokenError::BadSignature,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> (tempfile::TempDir, SigningKeyRing) {
        let dir = tempfile::tempdir().unwrap();
        let ring = SigningKeyRing::init(dir.path(), 5).unwrap();
        (dir, ring)
    }

    #[test]
    fn sign_then_parse_roundtrips_claims() {
        let (_dir, ring) = ring();
        let claims = Claims::new("user@example.com", 1_000, 86_400);
        let token = sign(&ring, &claims).unwrap();
        let parsed = parse(&ring, &token, 1_500, 60).unwrap();
        assert_eq!(parsed, claims);
    }

    #[test]
    fn tampering_the_signature_fails() {
        let (_dir, ring) = ring();
        let claims = Claims::new("user@example.com", 1_000, 86_400);
        let mut token = sign(&ring, &claims).unwrap();
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });

        let err = parse(&ring, &token, 1_500, 60).unwrap_err();
        assert!(matches!(err, TokenError::BadSignature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let (_dir, ring) = ring();
        let claims = Claims::new("user@example.com", 1_000, 10);
        let token = sign(&ring, &claims).unwrap();
        let err = parse(&ring, &token, 2_000, 0).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn rotated_key_still_verifies_old_tokens() {
        let (_dir, ring) = ring();
        let claims = Claims::new("user@example.com", 1_000, 86_400);
        let token = sign(&ring, &claims).unwrap();

        ring.rotate().unwrap();
        let parsed = parse(&ring, &token, 1_500, 60).unwrap();
        assert_eq!(parsed.sub, "user@example.com");
    }

    #[test]
    fn malformed_token_is_rejected() {
        let (_dir, ring) = ring();
        let err = parse(&ring, "not.a.jwt", 1_500, 60).unwrap_err();
        assert!(matches!(err, TokenError::Malformed));
    }
}
