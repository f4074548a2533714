use serde::{Deserialize, Serialize};

pub const ISSUER: &str = "arkfile-auth";
pub const AUDIENCE: &str = "arkfile-api";

/// Access token claims. `exp = iat + access_ttl`; `jti` uniquely identifies
/// this token (not used for revocation — access tokens are stateless, §4.D).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(sub: &str, iat: i64, ttl_secs: i64) -> Self {
        Self {
            sub: sub.to_string(),
            iss: ISSUER.to_string(),
            aud: vec![AUDIENCE.to_string()],
            iat,
            nbf: iat,
            exp: iat + ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }
}
