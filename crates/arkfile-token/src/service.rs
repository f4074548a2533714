use arkfile_store::{AuthStore, RefreshTokenRecord, StoreError};

use crate::access;
use crate::claims::Claims;
use crate::error::TokenError;
use crate::refresh;
use crate::signing::SigningKeyRing;

/// Token Service configuration: TTLs and clock-skew tolerance (§6
/// supplement — these come from `Config`, not hardcoded constants).
///
/// `refresh_ttl_secs` must stay well above `access_ttl_secs`: the glossary
/// defines the refresh token as the *long-lived* credential, and a refresh
/// token that expires alongside its access token can never be rotated past
/// the first access-token lifetime.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub clock_skew_secs: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_ttl_secs: 86_400,
            refresh_ttl_secs: 30 * 86_400,
            clock_skew_secs: 60,
        }
    }
}

/// A freshly issued access+refresh pair, as returned from login and from
/// refresh rotation.
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues, parses, and validates access tokens; issues, rotates, and revokes
/// refresh tokens (§4.D).
pub struct TokenService {
    store: AuthStore,
    ring: SigningKeyRing,
    config: TokenConfig,
}

impl TokenService {
    pub fn new(store: AuthStore, ring: SigningKeyRing, config: TokenConfig) -> Self {
        Self {
            store,
            ring,
            config,
        }
    }

    /// Mint a fresh access+refresh pair for `username`, persisting the
    /// refresh token's hash (never the token itself).
    pub async fn issue(
        &self,
        username: &str,
        now: i64,
        device_fingerprint: Option<String>,
    ) -> Result<TokenPair, TokenError> {
        let claims = Claims::new(username, now, self.config.access_ttl_secs);
        let access_token = access::sign(&self.ring, &claims)?;

        let refresh_token = refresh::generate();
        let token_hash = refresh::hash(&refresh_token);
        self.store
            .insert_refresh_token(RefreshTokenRecord {
                jti: claims.jti,
                username: username.to_string(),
                token_hash,
                issued_at: now,
                expires_at: now + self.config.refresh_ttl_secs,
                revoked_at: None,
                device_fingerprint,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Parse and verify a bearer access token (§4.D middleware boundary).
    pub fn parse_access_token(&self, token: &str, now: i64) -> Result<Claims, TokenError> {
        access::parse(&self.ring, token, now, self.config.clock_skew_secs)
    }

    /// Extract the bearer token from an `Authorization` header value.
    pub fn extract_bearer(header: Option<&str>) -> Result<&str, TokenError> {
        let header = header.ok_or(TokenError::MissingToken)?;
        header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::MissingToken)
    }

    /// Look up, verify, and atomically rotate a refresh token: the old
    /// token is revoked and a new access+refresh pair minted in one
    /// transaction. If the rotation cannot commit, the old token remains
    /// valid and no new token is issued (§4.D).
    pub async fn refresh(&self, presented_token: &str, now: i64) -> Result<TokenPair, TokenError> {
        let token_hash = refresh::hash(presented_token);
        let record = self
            .store
            .lookup_refresh_by_hash(&token_hash)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => TokenError::NotFound,
                other => TokenError::Store(other),
            })?;
        if !record.is_usable(now) {
            return Err(TokenError::Expired);
        }

        let claims = Claims::new(&record.username, now, self.config.access_ttl_secs);
        let access_token = access::sign(&self.ring, &claims)?;
        let new_refresh_token = refresh::generate();
        let new_hash = refresh::hash(&new_refresh_token);

        self.store
            .rotate_refresh_token(
                record.jti,
                RefreshTokenRecord {
                    jti: claims.jti,
                    username: record.username,
                    token_hash: new_hash,
                    issued_at: now,
                    expires_at: now + self.config.refresh_ttl_secs,
                    revoked_at: None,
                    device_fingerprint: record.device_fingerprint,
                },
                now,
            )
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
        })
    }

    /// Revoke a single refresh token by its presented value.
    pub async fn revoke(&self, presented_token: &str, now: i64) -> Result<(), TokenError> {
        let token_hash = refresh::hash(presented_token);
        let record = self
            .store
            .lookup_refresh_by_hash(&token_hash)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => TokenError::NotFound,
                other => TokenError::Store(other),
            })?;
        self.store.revoke_refresh_by_id(&record.jti, now).await?;
        Ok(())
    }

    /// Revoke every refresh token belonging to `username` in one
    /// transaction. In-flight access tokens remain valid until `exp`
    /// (stateless trade-off, §4.D) — clients are expected to discard them.
    pub async fn revoke_all(&self, username: &str, now: i64) -> Result<u64, TokenError> {
        Ok(self.store.revoke_all_refresh_for_user(username, now).await?)
    }

    pub fn rotate_signing_key(&self) -> Result<(), TokenError> {
        self.ring.rotate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (tempfile::TempDir, TokenService) {
        let dir = tempfile::tempdir().unwrap();
        let store = AuthStore::open(None).unwrap();
        let ring = SigningKeyRing::init(dir.path(), 5).unwrap();
        let svc = TokenService::new(store, ring, TokenConfig::default());
        (dir, svc)
    }

    #[tokio::test]
    async fn issue_then_parse_access_token() {
        let (_dir, svc) = service();
        let pair = svc.issue("alice@example.com", 1_000, None).await.unwrap();
        let claims = svc.parse_access_token(&pair.access_token, 1_500).unwrap();
        assert_eq!(claims.sub, "alice@example.com");
    }

    #[tokio::test]
    async fn refresh_token_outlives_its_access_token() {
        let (_dir, svc) = service();
        let pair = svc.issue("alice@example.com", 1_000, None).await.unwrap();

        // The access token has long since expired...
        let expired = svc.parse_access_token(&pair.access_token, 1_000 + 86_400 + 1);
        assert!(matches!(expired, Err(TokenError::Expired)));

        // ...but the refresh token, being long-lived, still rotates fine.
        svc.refresh(&pair.refresh_token, 1_000 + 86_400 + 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_rotation_invalidates_old_token() {
        let (_dir, svc) = service();
        let pair0 = svc.issue("alice@example.com", 1_000, None).await.unwrap();

        let pair1 = svc.refresh(&pair0.refresh_token, 2_000).await.unwrap();
        let err = svc
            .refresh(&pair0.refresh_token, 2_500)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Expired));

        let pair2 = svc.refresh(&pair1.refresh_token, 3_000).await.unwrap();
        assert_ne!(pair1.refresh_token, pair2.refresh_token);
    }

    #[tokio::test]
    async fn revoke_all_invalidates_every_token() {
        let (_dir, svc) = service();
        let pair_a = svc.issue("alice@example.com", 1_000, None).await.unwrap();
        let pair_b = svc.issue("alice@example.com", 1_000, None).await.unwrap();

        let revoked = svc.revoke_all("alice@example.com", 2_000).await.unwrap();
        assert_eq!(revoked, 2);

        assert!(svc.refresh(&pair_a.refresh_token, 2_100).await.is_err());
        assert!(svc.refresh(&pair_b.refresh_token, 2_100).await.is_err());
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_not_found() {
        let (_dir, svc) = service();
        let err = svc.refresh("not-a-real-token", 1_000).await.unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }

    #[test]
    fn extract_bearer_rejects_missing_and_malformed_headers() {
        assert!(matches!(
            TokenService::extract_bearer(None),
            Err(TokenError::MissingToken)
        ));
        assert!(matches!(
            TokenService::extract_bearer(Some("Basic abc")),
            Err(TokenError::MissingToken)
        ));
        assert_eq!(
            TokenService::extract_bearer(Some("Bearer abc.def.ghi")).unwrap(),
            "abc.def.ghi"
        );
    }
}
